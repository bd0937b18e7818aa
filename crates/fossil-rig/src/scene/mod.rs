//! Host scene boundary.
//!
//! The engine never owns scene data. Every node, curve, constraint record,
//! attribute and keyframe it produces lives in a host behind the [`Scene`]
//! trait. [`MemoryScene`] is the in-process host used by the CLI and tests.

mod memory;

pub use memory::{MemoryScene, SolverSettings};

use std::fmt;

use glam::{DMat4, DQuat, DVec3};

use crate::component::StretchParams;
use crate::curve::{ControlColor, CurveGeometry};
use crate::error::SceneError;
use crate::stretch::StretchMode;
use crate::transform::{Axis, Transform};

/// Animation time in whole frames.
pub type Frame = i32;

/// Opaque handle to a scene node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle to a constraint record. Ids increase in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Empty transform.
    Group,
    /// Transform carrying control curve geometry.
    Curve,
    /// Skeleton joint. Joints parented to joints do not inherit their
    /// parent's scale, only its scaled offset.
    Joint,
}

/// Keyable attribute type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeKind {
    /// Continuous value with linear key interpolation.
    Scalar,
    /// Index into a label list with stepped key interpolation.
    Enum(Vec<String>),
}

// =============================================================================
// Constraint records
// =============================================================================

/// Where a stretch measurement is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurePoint {
    /// Fully evaluated world position of the node.
    Node(NodeId),
    /// World position of the node's pivot from its parent and local
    /// translation only, ignoring constraints on the node itself.
    Origin(NodeId),
}

/// Selects the world frame for one channel of a space node.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceSource {
    /// Candidate frames; `None` is the world origin.
    pub candidates: Vec<Option<NodeId>>,
    /// Enum attribute holding the selected index.
    pub selector: Option<(NodeId, String)>,
    /// Index used when there is no selector.
    pub default: usize,
}

impl SpaceSource {
    /// A fixed single-candidate source.
    pub fn fixed(node: Option<NodeId>) -> Self {
        Self {
            candidates: vec![node],
            selector: None,
            default: 0,
        }
    }

    /// Candidate for `index`; out of range selects world.
    pub fn candidate(&self, index: usize) -> Option<NodeId> {
        self.candidates.get(index).copied().flatten()
    }
}

/// Drives a space node: translation and scale from the parent source,
/// rotation from the upright source.
#[derive(Debug, Clone, PartialEq)]
pub struct SpaceConstraint {
    pub driven: NodeId,
    pub parent: SpaceSource,
    pub upright: SpaceSource,
}

/// Scales a node along an axis from a measured distance.
#[derive(Debug, Clone, PartialEq)]
pub struct StretchDriver {
    pub driven: NodeId,
    pub from: MeasurePoint,
    pub to: MeasurePoint,
    pub rest_length: f64,
    /// Node whose world scale divides the measured distance.
    pub reference: Option<NodeId>,
    pub axis: Axis,
    pub mode: StretchMode,
    pub params: StretchParams,
}

/// How an IK record solves its chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IkMethod {
    /// Analytic solve on a three-joint chain.
    TwoBone,
    /// Iterative solve on any chain length.
    Chain,
}

/// Moves and orients every joint of `chain` but the last so the last joint
/// reaches the effector.
#[derive(Debug, Clone, PartialEq)]
pub struct IkSolver {
    pub chain: Vec<NodeId>,
    pub effector: NodeId,
    pub pole: Option<NodeId>,
    /// Bend direction in effector space, used without a pole.
    pub bend_hint: DVec3,
    /// Scalar attribute holding a twist angle in degrees about the
    /// root-to-effector axis.
    pub twist: Option<(NodeId, String)>,
    pub method: IkMethod,
}

/// A constraint record understood by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Driven follows driver translation and rotation with a rigid offset.
    Parent {
        driver: NodeId,
        driven: NodeId,
        offset: Transform,
    },
    /// Driven world rotation is the driver's times `offset`.
    Orient {
        driver: NodeId,
        driven: NodeId,
        offset: DQuat,
    },
    /// Driven local scale is the driver's world scale times `offset`.
    Scale {
        driver: NodeId,
        driven: NodeId,
        offset: DVec3,
    },
    /// Driven `axis` points at the target.
    Aim {
        target: NodeId,
        driven: NodeId,
        axis: Axis,
    },
    Space(SpaceConstraint),
    Stretch(StretchDriver),
    Ik(IkSolver),
}

impl Constraint {
    /// Nodes whose transform this record overrides.
    pub fn driven(&self) -> Vec<NodeId> {
        match self {
            Constraint::Parent { driven, .. }
            | Constraint::Orient { driven, .. }
            | Constraint::Scale { driven, .. }
            | Constraint::Aim { driven, .. } => vec![*driven],
            Constraint::Space(space) => vec![space.driven],
            Constraint::Stretch(stretch) => vec![stretch.driven],
            Constraint::Ik(ik) => ik.chain[..ik.chain.len().saturating_sub(1)].to_vec(),
        }
    }

    /// Every node the record reads or writes.
    pub fn references(&self) -> Vec<NodeId> {
        let mut nodes = self.driven();
        match self {
            Constraint::Parent { driver, .. }
            | Constraint::Orient { driver, .. }
            | Constraint::Scale { driver, .. } => nodes.push(*driver),
            Constraint::Aim { target, .. } => nodes.push(*target),
            Constraint::Space(space) => {
                for source in [&space.parent, &space.upright] {
                    nodes.extend(source.candidates.iter().flatten());
                    nodes.extend(source.selector.iter().map(|(node, _)| *node));
                }
            }
            Constraint::Stretch(stretch) => {
                for point in [stretch.from, stretch.to] {
                    match point {
                        MeasurePoint::Node(node) | MeasurePoint::Origin(node) => nodes.push(node),
                    }
                }
                nodes.extend(stretch.reference);
            }
            Constraint::Ik(ik) => {
                nodes.extend(ik.chain.last());
                nodes.push(ik.effector);
                nodes.extend(ik.pole);
                nodes.extend(ik.twist.iter().map(|(node, _)| *node));
            }
        }
        nodes
    }
}

// =============================================================================
// Scene trait
// =============================================================================

/// Operations the engine needs from a host scene.
///
/// Reads of local transforms and attributes are evaluated at the current
/// frame: keyed channels follow their keys, unkeyed ones their static value.
pub trait Scene {
    fn create_node(
        &mut self,
        name: &str,
        kind: NodeKind,
        parent: Option<NodeId>,
    ) -> Result<NodeId, SceneError>;

    /// Deletes the node, its descendants and every constraint touching them.
    fn delete_node(&mut self, node: NodeId) -> Result<(), SceneError>;

    fn contains(&self, node: NodeId) -> bool;

    /// First node with this name, in creation order.
    fn find(&self, name: &str) -> Option<NodeId>;

    fn node_name(&self, node: NodeId) -> Result<String, SceneError>;

    fn node_kind(&self, node: NodeId) -> Result<NodeKind, SceneError>;

    fn parent(&self, node: NodeId) -> Result<Option<NodeId>, SceneError>;

    fn children(&self, node: NodeId) -> Result<Vec<NodeId>, SceneError>;

    fn local_transform(&self, node: NodeId) -> Result<Transform, SceneError>;

    /// Sets the static local transform used while the node has no keys.
    fn set_local_transform(&mut self, node: NodeId, transform: Transform) -> Result<(), SceneError>;

    /// World matrix with every constraint applied.
    fn world_matrix(&self, node: NodeId) -> Result<DMat4, SceneError>;

    fn set_curve(
        &mut self,
        node: NodeId,
        geometry: CurveGeometry,
        color: ControlColor,
    ) -> Result<(), SceneError>;

    fn curve(&self, node: NodeId) -> Result<CurveGeometry, SceneError>;

    fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintId, SceneError>;

    fn remove_constraint(&mut self, id: ConstraintId) -> Result<(), SceneError>;

    fn constraint(&self, id: ConstraintId) -> Option<&Constraint>;

    /// Constraints overriding `node`, in creation order.
    fn constraints_on(&self, node: NodeId) -> Vec<ConstraintId>;

    fn add_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        kind: AttributeKind,
        default: f64,
    ) -> Result<(), SceneError>;

    fn has_attribute(&self, node: NodeId, name: &str) -> bool;

    fn attribute_kind(&self, node: NodeId, name: &str) -> Result<AttributeKind, SceneError>;

    fn attribute(&self, node: NodeId, name: &str) -> Result<f64, SceneError>;

    fn set_attribute(&mut self, node: NodeId, name: &str, value: f64) -> Result<(), SceneError>;

    fn set_attribute_key(
        &mut self,
        node: NodeId,
        name: &str,
        frame: Frame,
        value: f64,
    ) -> Result<(), SceneError>;

    fn attribute_keys(&self, node: NodeId, name: &str) -> Result<Vec<(Frame, f64)>, SceneError>;

    fn clear_attribute_keys(&mut self, node: NodeId, name: &str) -> Result<(), SceneError>;

    fn set_transform_key(
        &mut self,
        node: NodeId,
        frame: Frame,
        transform: Transform,
    ) -> Result<(), SceneError>;

    fn transform_keys(&self, node: NodeId) -> Result<Vec<(Frame, Transform)>, SceneError>;

    fn clear_transform_keys(&mut self, node: NodeId) -> Result<(), SceneError>;

    fn current_frame(&self) -> Frame;

    fn set_current_frame(&mut self, frame: Frame);
}

/// World transform of a node, decomposed.
pub fn world_transform(scene: &dyn Scene, node: NodeId) -> Result<Transform, SceneError> {
    scene.world_matrix(node).map(Transform::from_matrix)
}

/// World matrix of an optional parent; `None` is the world origin.
pub fn parent_world(scene: &dyn Scene, node: NodeId) -> Result<DMat4, SceneError> {
    match scene.parent(node)? {
        Some(parent) => scene.world_matrix(parent),
        None => Ok(DMat4::IDENTITY),
    }
}
