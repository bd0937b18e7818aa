//! In-process reference host.
//!
//! Stores nodes, curves, keyframes, attributes and constraint records, and
//! evaluates world transforms at the current frame. Evaluation order per
//! node: local transform (keys or static), local scale overrides from
//! `Scale` and `Stretch` records, parent composition, then `Parent`,
//! `Orient`, `Space` and `Aim` records in creation order. `Ik` records
//! replace the whole evaluation of the joints they drive.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use glam::{DMat4, DQuat, DVec3};

use super::{
    AttributeKind, Constraint, ConstraintId, Frame, IkMethod, IkSolver, MeasurePoint, NodeId,
    NodeKind, Scene, SpaceSource,
};
use crate::curve::{ControlColor, CurveGeometry};
use crate::error::SceneError;
use crate::stretch;
use crate::transform::{
    axis_scale, resolve_space_frame, shortest_arc, solve_fabrik, solve_two_bone, uniform_scale,
    Transform,
};

/// Iterative solver limits for `IkMethod::Chain`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub ik_iterations: usize,
    pub ik_tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            ik_iterations: 32,
            ik_tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone)]
struct Attribute {
    kind: AttributeKind,
    value: f64,
    keys: BTreeMap<Frame, f64>,
}

impl Attribute {
    fn evaluate(&self, frame: Frame) -> f64 {
        let before = self.keys.range(..=frame).next_back();
        let after = self.keys.range(frame..).next();
        match (before, after) {
            (None, None) => self.value,
            (Some((_, v)), None) | (None, Some((_, v))) => *v,
            (Some((f0, v0)), Some((f1, v1))) => {
                if f0 == f1 || matches!(self.kind, AttributeKind::Enum(_)) {
                    *v0
                } else {
                    let t = f64::from(frame - f0) / f64::from(f1 - f0);
                    v0 + (v1 - v0) * t
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Node {
    name: String,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    local: Transform,
    keys: BTreeMap<Frame, Transform>,
    attributes: BTreeMap<String, Attribute>,
    curve: Option<(CurveGeometry, ControlColor)>,
}

impl Node {
    fn local_at(&self, frame: Frame) -> Transform {
        let before = self.keys.range(..=frame).next_back();
        let after = self.keys.range(frame..).next();
        match (before, after) {
            (None, None) => self.local,
            (Some((_, t)), None) | (None, Some((_, t))) => *t,
            (Some((f0, t0)), Some((f1, t1))) => {
                if f0 == f1 {
                    *t0
                } else {
                    let t = f64::from(frame - f0) / f64::from(f1 - f0);
                    t0.interpolate(t1, t)
                }
            }
        }
    }
}

/// Reference [`Scene`] implementation kept entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryScene {
    nodes: BTreeMap<NodeId, Node>,
    constraints: BTreeMap<ConstraintId, Constraint>,
    next_node: u64,
    next_constraint: u64,
    frame: Frame,
    solver: SolverSettings,
    cache: RefCell<BTreeMap<NodeId, DMat4>>,
    visiting: RefCell<BTreeSet<NodeId>>,
}

impl MemoryScene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_solver_settings(mut self, solver: SolverSettings) -> Self {
        self.solver = solver;
        self
    }

    pub fn solver_settings(&self) -> SolverSettings {
        self.solver
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Nodes without a parent, in creation order.
    pub fn roots(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| *id)
            .collect()
    }

    fn node(&self, id: NodeId) -> Result<&Node, SceneError> {
        self.nodes.get(&id).ok_or(SceneError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, SceneError> {
        self.cache.get_mut().clear();
        self.nodes.get_mut(&id).ok_or(SceneError::UnknownNode(id))
    }

    fn attribute_mut(&mut self, node: NodeId, name: &str) -> Result<&mut Attribute, SceneError> {
        self.node_mut(node)?
            .attributes
            .get_mut(name)
            .ok_or_else(|| SceneError::UnknownAttribute {
                node,
                attribute: name.to_string(),
            })
    }

    fn attribute_ref(&self, node: NodeId, name: &str) -> Result<&Attribute, SceneError> {
        self.node(node)?
            .attributes
            .get(name)
            .ok_or_else(|| SceneError::UnknownAttribute {
                node,
                attribute: name.to_string(),
            })
    }

    fn subtree(&self, root: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.nodes.get(&id) {
                out.push(id);
                stack.extend(node.children.iter().copied());
            }
        }
        out
    }

    // =========================================================================
    // Evaluation
    // =========================================================================

    fn evaluate(&self, node: NodeId) -> Result<DMat4, SceneError> {
        let cached = self.cache.borrow().get(&node).copied();
        if let Some(world) = cached {
            return Ok(world);
        }
        if !self.visiting.borrow_mut().insert(node) {
            return Err(SceneError::EvaluationCycle(node));
        }
        let result = self.evaluate_uncached(node);
        self.visiting.borrow_mut().remove(&node);
        let world = result?;
        self.cache.borrow_mut().insert(node, world);
        Ok(world)
    }

    fn evaluate_uncached(&self, node: NodeId) -> Result<DMat4, SceneError> {
        let ik = self
            .constraints
            .values()
            .find_map(|constraint| match constraint {
                Constraint::Ik(ik) if ik.chain[..ik.chain.len().saturating_sub(1)].contains(&node) => {
                    Some(ik)
                }
                _ => None,
            });
        let Some(ik) = ik else {
            return self.evaluate_constrained(node);
        };
        let solved = self.solve_ik(ik)?;
        let mut world = None;
        let mut cache = self.cache.borrow_mut();
        for (joint, matrix) in solved {
            if joint == node {
                world = Some(matrix);
            } else {
                cache.insert(joint, matrix);
            }
        }
        drop(cache);
        match world {
            Some(world) => Ok(world),
            None => self.evaluate_constrained(node),
        }
    }

    /// Evaluates a node with every record except `Ik`.
    fn evaluate_constrained(&self, id: NodeId) -> Result<DMat4, SceneError> {
        let node = self.node(id)?;
        let local = self.effective_local(id, node)?;
        let (parent_world, parent_is_joint) = self.parent_frame(node)?;
        let mut world = compose(parent_world, parent_is_joint, node.kind, &local);

        for constraint in self.records_on(id) {
            match constraint {
                Constraint::Parent { driver, offset, .. } => {
                    let driver = Transform::from_matrix(self.evaluate(*driver)?).rigid();
                    let placed = driver.mul_transform(&offset.rigid());
                    let natural = Transform::from_matrix(world);
                    world = placed.with_scale(natural.scale).to_matrix();
                }
                Constraint::Orient { driver, offset, .. } => {
                    let driver = Transform::from_matrix(self.evaluate(*driver)?);
                    let current = Transform::from_matrix(world);
                    world = current
                        .with_rotation((driver.rotation * *offset).normalize())
                        .to_matrix();
                }
                Constraint::Aim { target, axis, .. } => {
                    let target = self.evaluate(*target)?.transform_point3(DVec3::ZERO);
                    let current = Transform::from_matrix(world);
                    let facing = current.rotation * axis.vector();
                    let arc = shortest_arc(facing, target - current.translation);
                    world = current
                        .with_rotation((arc * current.rotation).normalize())
                        .to_matrix();
                }
                Constraint::Space(space) => {
                    let parent = self.space_frame(&space.parent)?;
                    let upright = self.space_frame(&space.upright)?;
                    world = resolve_space_frame(parent, upright);
                }
                Constraint::Scale { .. } | Constraint::Stretch(_) | Constraint::Ik(_) => {}
            }
        }
        Ok(world)
    }

    fn records_on(&self, node: NodeId) -> impl Iterator<Item = &Constraint> {
        self.constraints
            .values()
            .filter(move |constraint| constraint.driven().contains(&node))
    }

    /// Local transform at the current frame with scale overrides applied.
    fn effective_local(&self, id: NodeId, node: &Node) -> Result<Transform, SceneError> {
        let mut local = node.local_at(self.frame);
        for constraint in self.records_on(id) {
            match constraint {
                Constraint::Scale { driver, offset, .. } => {
                    let driver = Transform::from_matrix(self.evaluate(*driver)?);
                    local.scale = driver.scale * *offset;
                }
                Constraint::Stretch(driver) => {
                    let from = self.measure(driver.from)?;
                    let to = self.measure(driver.to)?;
                    let scale = match driver.reference {
                        Some(reference) => uniform_scale(self.evaluate(reference)?),
                        None => 1.0,
                    };
                    let factors = stretch::evaluate(
                        &driver.params,
                        driver.mode,
                        from.distance(to) / scale,
                        driver.rest_length,
                    );
                    local.scale *= axis_scale(driver.axis, factors.stretch, factors.squash);
                }
                _ => {}
            }
        }
        Ok(local)
    }

    fn parent_frame(&self, node: &Node) -> Result<(DMat4, bool), SceneError> {
        match node.parent {
            Some(parent) => {
                let is_joint = self.node(parent)?.kind == NodeKind::Joint;
                Ok((self.evaluate(parent)?, is_joint))
            }
            None => Ok((DMat4::IDENTITY, false)),
        }
    }

    fn measure(&self, point: MeasurePoint) -> Result<DVec3, SceneError> {
        match point {
            MeasurePoint::Node(id) => Ok(self.evaluate(id)?.transform_point3(DVec3::ZERO)),
            MeasurePoint::Origin(id) => {
                let node = self.node(id)?;
                let (parent_world, _) = self.parent_frame(node)?;
                Ok(parent_world.transform_point3(node.local_at(self.frame).translation))
            }
        }
    }

    fn space_frame(&self, source: &SpaceSource) -> Result<DMat4, SceneError> {
        let index = match &source.selector {
            Some((node, attribute)) => {
                let value = self.attribute_ref(*node, attribute)?.evaluate(self.frame);
                if value < 0.0 {
                    usize::MAX
                } else {
                    value.round() as usize
                }
            }
            None => source.default,
        };
        match source.candidate(index) {
            Some(node) => self.evaluate(node),
            None => Ok(DMat4::IDENTITY),
        }
    }

    /// Solves an IK record; returns world matrices for every driven joint.
    fn solve_ik(&self, ik: &IkSolver) -> Result<Vec<(NodeId, DMat4)>, SceneError> {
        let count = ik.chain.len();
        if count < 2 {
            return Ok(Vec::new());
        }

        // Forward pose from the joints' own locals.
        let mut worlds = Vec::with_capacity(count);
        worlds.push(self.evaluate_constrained(ik.chain[0])?);
        for i in 1..count {
            let node = self.node(ik.chain[i])?;
            let local = self.effective_local(ik.chain[i], node)?;
            let parent_is_joint = self.node(ik.chain[i - 1])?.kind == NodeKind::Joint;
            worlds.push(compose(worlds[i - 1], parent_is_joint, node.kind, &local));
        }
        let points: Vec<DVec3> = worlds
            .iter()
            .map(|world| world.transform_point3(DVec3::ZERO))
            .collect();

        let effector = Transform::from_matrix(self.evaluate(ik.effector)?);
        let target = effector.translation;
        let axis = (target - points[0]).normalize_or_zero();
        let twist = match &ik.twist {
            Some((node, attribute)) => self
                .attribute_ref(*node, attribute)?
                .evaluate(self.frame)
                .to_radians(),
            None => 0.0,
        };
        let twist = if axis == DVec3::ZERO {
            DQuat::IDENTITY
        } else {
            DQuat::from_axis_angle(axis, twist)
        };

        let solved = match ik.method {
            IkMethod::TwoBone if count == 3 => {
                let hint = match ik.pole {
                    Some(pole) => self.evaluate(pole)?.transform_point3(DVec3::ZERO) - points[0],
                    None => effector.rotation * ik.bend_hint,
                };
                let (mid, end) = solve_two_bone(
                    points[0],
                    points[0].distance(points[1]),
                    points[1].distance(points[2]),
                    target,
                    twist * hint,
                );
                vec![points[0], mid, end]
            }
            _ => {
                let solved = solve_fabrik(
                    &points,
                    target,
                    self.solver.ik_iterations,
                    self.solver.ik_tolerance,
                );
                solved
                    .into_iter()
                    .map(|p| points[0] + twist * (p - points[0]))
                    .collect()
            }
        };

        let mut out = Vec::with_capacity(count - 1);
        for i in 0..count - 1 {
            let before = Transform::from_matrix(worlds[i]);
            let arc = shortest_arc(points[i + 1] - points[i], solved[i + 1] - solved[i]);
            let rotation = (arc * before.rotation).normalize();
            let world = Transform::new(solved[i], rotation, before.scale).to_matrix();
            out.push((ik.chain[i], world));
        }
        Ok(out)
    }
}

/// Joints under joints take their parent's scaled offset but not its scale.
fn compose(parent_world: DMat4, parent_is_joint: bool, kind: NodeKind, local: &Transform) -> DMat4 {
    if kind == NodeKind::Joint && parent_is_joint {
        let parent = Transform::from_matrix(parent_world);
        let position = parent_world.transform_point3(local.translation);
        DMat4::from_scale_rotation_translation(
            local.scale,
            (parent.rotation * local.rotation).normalize(),
            position,
        )
    } else {
        parent_world * local.to_matrix()
    }
}

impl Scene for MemoryScene {
    fn create_node(
        &mut self,
        name: &str,
        kind: NodeKind,
        parent: Option<NodeId>,
    ) -> Result<NodeId, SceneError> {
        if let Some(parent) = parent {
            self.node(parent)?;
        }
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(
            id,
            Node {
                name: name.to_string(),
                kind,
                parent,
                children: Vec::new(),
                local: Transform::IDENTITY,
                keys: BTreeMap::new(),
                attributes: BTreeMap::new(),
                curve: None,
            },
        );
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.push(id);
        }
        self.cache.get_mut().clear();
        Ok(id)
    }

    fn delete_node(&mut self, node: NodeId) -> Result<(), SceneError> {
        let parent = self.node(node)?.parent;
        let doomed: BTreeSet<NodeId> = self.subtree(node).into_iter().collect();
        if let Some(parent) = parent {
            self.node_mut(parent)?.children.retain(|child| *child != node);
        }
        for id in &doomed {
            self.nodes.remove(id);
        }
        self.constraints.retain(|_, constraint| {
            !constraint
                .references()
                .iter()
                .any(|id| doomed.contains(id))
        });
        self.cache.get_mut().clear();
        Ok(())
    }

    fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains_key(&node)
    }

    fn find(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name == name)
            .map(|(id, _)| *id)
    }

    fn node_name(&self, node: NodeId) -> Result<String, SceneError> {
        Ok(self.node(node)?.name.clone())
    }

    fn node_kind(&self, node: NodeId) -> Result<NodeKind, SceneError> {
        Ok(self.node(node)?.kind)
    }

    fn parent(&self, node: NodeId) -> Result<Option<NodeId>, SceneError> {
        Ok(self.node(node)?.parent)
    }

    fn children(&self, node: NodeId) -> Result<Vec<NodeId>, SceneError> {
        Ok(self.node(node)?.children.clone())
    }

    fn local_transform(&self, node: NodeId) -> Result<Transform, SceneError> {
        Ok(self.node(node)?.local_at(self.frame))
    }

    fn set_local_transform(&mut self, node: NodeId, transform: Transform) -> Result<(), SceneError> {
        self.node_mut(node)?.local = transform;
        Ok(())
    }

    fn world_matrix(&self, node: NodeId) -> Result<DMat4, SceneError> {
        self.node(node)?;
        self.evaluate(node)
    }

    fn set_curve(
        &mut self,
        node: NodeId,
        geometry: CurveGeometry,
        color: ControlColor,
    ) -> Result<(), SceneError> {
        let entry = self.node_mut(node)?;
        if entry.kind != NodeKind::Curve {
            return Err(SceneError::NotACurve(node));
        }
        entry.curve = Some((geometry, color));
        Ok(())
    }

    fn curve(&self, node: NodeId) -> Result<CurveGeometry, SceneError> {
        let entry = self.node(node)?;
        match (&entry.kind, &entry.curve) {
            (NodeKind::Curve, Some((geometry, _))) => Ok(geometry.clone()),
            (NodeKind::Curve, None) => Ok(CurveGeometry::default()),
            _ => Err(SceneError::NotACurve(node)),
        }
    }

    fn add_constraint(&mut self, constraint: Constraint) -> Result<ConstraintId, SceneError> {
        for node in constraint.references() {
            self.node(node)?;
        }
        let id = ConstraintId(self.next_constraint);
        self.next_constraint += 1;
        self.constraints.insert(id, constraint);
        self.cache.get_mut().clear();
        Ok(id)
    }

    fn remove_constraint(&mut self, id: ConstraintId) -> Result<(), SceneError> {
        self.constraints
            .remove(&id)
            .ok_or(SceneError::UnknownConstraint(id.0))?;
        self.cache.get_mut().clear();
        Ok(())
    }

    fn constraint(&self, id: ConstraintId) -> Option<&Constraint> {
        self.constraints.get(&id)
    }

    fn constraints_on(&self, node: NodeId) -> Vec<ConstraintId> {
        self.constraints
            .iter()
            .filter(|(_, constraint)| constraint.driven().contains(&node))
            .map(|(id, _)| *id)
            .collect()
    }

    fn add_attribute(
        &mut self,
        node: NodeId,
        name: &str,
        kind: AttributeKind,
        default: f64,
    ) -> Result<(), SceneError> {
        let entry = self.node_mut(node)?;
        if entry.attributes.contains_key(name) {
            return Err(SceneError::DuplicateAttribute {
                node,
                attribute: name.to_string(),
            });
        }
        entry.attributes.insert(
            name.to_string(),
            Attribute {
                kind,
                value: default,
                keys: BTreeMap::new(),
            },
        );
        Ok(())
    }

    fn has_attribute(&self, node: NodeId, name: &str) -> bool {
        self.nodes
            .get(&node)
            .is_some_and(|entry| entry.attributes.contains_key(name))
    }

    fn attribute_kind(&self, node: NodeId, name: &str) -> Result<AttributeKind, SceneError> {
        Ok(self.attribute_ref(node, name)?.kind.clone())
    }

    fn attribute(&self, node: NodeId, name: &str) -> Result<f64, SceneError> {
        Ok(self.attribute_ref(node, name)?.evaluate(self.frame))
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: f64) -> Result<(), SceneError> {
        self.attribute_mut(node, name)?.value = value;
        Ok(())
    }

    fn set_attribute_key(
        &mut self,
        node: NodeId,
        name: &str,
        frame: Frame,
        value: f64,
    ) -> Result<(), SceneError> {
        self.attribute_mut(node, name)?.keys.insert(frame, value);
        Ok(())
    }

    fn attribute_keys(&self, node: NodeId, name: &str) -> Result<Vec<(Frame, f64)>, SceneError> {
        Ok(self
            .attribute_ref(node, name)?
            .keys
            .iter()
            .map(|(f, v)| (*f, *v))
            .collect())
    }

    fn clear_attribute_keys(&mut self, node: NodeId, name: &str) -> Result<(), SceneError> {
        self.attribute_mut(node, name)?.keys.clear();
        Ok(())
    }

    fn set_transform_key(
        &mut self,
        node: NodeId,
        frame: Frame,
        transform: Transform,
    ) -> Result<(), SceneError> {
        self.node_mut(node)?.keys.insert(frame, transform);
        Ok(())
    }

    fn transform_keys(&self, node: NodeId) -> Result<Vec<(Frame, Transform)>, SceneError> {
        Ok(self
            .node(node)?
            .keys
            .iter()
            .map(|(f, t)| (*f, *t))
            .collect())
    }

    fn clear_transform_keys(&mut self, node: NodeId) -> Result<(), SceneError> {
        self.node_mut(node)?.keys.clear();
        Ok(())
    }

    fn current_frame(&self) -> Frame {
        self.frame
    }

    fn set_current_frame(&mut self, frame: Frame) {
        if self.frame != frame {
            self.frame = frame;
            self.cache.get_mut().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::StretchParams;
    use crate::scene::{world_transform, SpaceConstraint, StretchDriver};
    use crate::stretch::StretchMode;
    use crate::transform::Axis;
    use std::f64::consts::FRAC_PI_2;

    const TOL: f64 = 1e-6;

    fn position(scene: &MemoryScene, node: NodeId) -> DVec3 {
        scene.world_matrix(node).unwrap().transform_point3(DVec3::ZERO)
    }

    fn joint(scene: &mut MemoryScene, name: &str, parent: Option<NodeId>, offset: DVec3) -> NodeId {
        let id = scene.create_node(name, NodeKind::Joint, parent).unwrap();
        scene
            .set_local_transform(id, Transform::from_translation(offset))
            .unwrap();
        id
    }

    fn arm(scene: &mut MemoryScene) -> [NodeId; 3] {
        let a = joint(scene, "shoulder", None, DVec3::ZERO);
        let b = joint(scene, "elbow", Some(a), DVec3::X);
        let c = joint(scene, "wrist", Some(b), DVec3::X);
        [a, b, c]
    }

    #[test]
    fn test_hierarchy_composes() {
        let mut scene = MemoryScene::new();
        let root = scene.create_node("root", NodeKind::Group, None).unwrap();
        scene
            .set_local_transform(
                root,
                Transform::new(DVec3::new(1.0, 0.0, 0.0), DQuat::from_rotation_z(FRAC_PI_2), DVec3::ONE),
            )
            .unwrap();
        let child = scene.create_node("child", NodeKind::Group, Some(root)).unwrap();
        scene
            .set_local_transform(child, Transform::from_translation(DVec3::X))
            .unwrap();
        assert!(position(&scene, child).abs_diff_eq(DVec3::new(1.0, 1.0, 0.0), TOL));
        assert_eq!(scene.children(root).unwrap(), vec![child]);
        assert_eq!(scene.find("child"), Some(child));
    }

    #[test]
    fn test_joint_does_not_inherit_parent_scale() {
        let mut scene = MemoryScene::new();
        let [a, b, _] = arm(&mut scene);
        scene
            .set_local_transform(a, Transform::IDENTITY.with_scale(DVec3::new(2.0, 1.0, 1.0)))
            .unwrap();
        let world = world_transform(&scene, b).unwrap();
        assert!(world.translation.abs_diff_eq(DVec3::new(2.0, 0.0, 0.0), TOL));
        assert!(world.scale.abs_diff_eq(DVec3::ONE, TOL));
    }

    #[test]
    fn test_transform_keys_interpolate_and_hold() {
        let mut scene = MemoryScene::new();
        let node = scene.create_node("n", NodeKind::Group, None).unwrap();
        scene
            .set_transform_key(node, 0, Transform::from_translation(DVec3::ZERO))
            .unwrap();
        scene
            .set_transform_key(node, 10, Transform::from_translation(DVec3::new(10.0, 0.0, 0.0)))
            .unwrap();
        scene.set_current_frame(5);
        assert!(position(&scene, node).abs_diff_eq(DVec3::new(5.0, 0.0, 0.0), TOL));
        scene.set_current_frame(20);
        assert!(position(&scene, node).abs_diff_eq(DVec3::new(10.0, 0.0, 0.0), TOL));
        scene.set_current_frame(-5);
        assert!(position(&scene, node).abs_diff_eq(DVec3::ZERO, TOL));
    }

    #[test]
    fn test_enum_attribute_steps() {
        let mut scene = MemoryScene::new();
        let node = scene.create_node("n", NodeKind::Group, None).unwrap();
        scene
            .add_attribute(node, "space", AttributeKind::Enum(vec!["a".into(), "b".into()]), 0.0)
            .unwrap();
        scene.set_attribute_key(node, "space", 0, 0.0).unwrap();
        scene.set_attribute_key(node, "space", 10, 1.0).unwrap();
        scene.set_current_frame(9);
        assert_eq!(scene.attribute(node, "space").unwrap(), 0.0);
        scene.set_current_frame(10);
        assert_eq!(scene.attribute(node, "space").unwrap(), 1.0);
        assert!(matches!(
            scene.add_attribute(node, "space", AttributeKind::Scalar, 0.0),
            Err(SceneError::DuplicateAttribute { .. })
        ));
    }

    #[test]
    fn test_scalar_attribute_interpolates() {
        let mut scene = MemoryScene::new();
        let node = scene.create_node("n", NodeKind::Group, None).unwrap();
        scene.add_attribute(node, "twist", AttributeKind::Scalar, 0.0).unwrap();
        scene.set_attribute_key(node, "twist", 0, 0.0).unwrap();
        scene.set_attribute_key(node, "twist", 4, 8.0).unwrap();
        scene.set_current_frame(1);
        assert!((scene.attribute(node, "twist").unwrap() - 2.0).abs() < TOL);
    }

    #[test]
    fn test_parent_constraint_follows_driver() {
        let mut scene = MemoryScene::new();
        let driver = scene.create_node("driver", NodeKind::Curve, None).unwrap();
        let driven = scene.create_node("driven", NodeKind::Joint, None).unwrap();
        scene
            .add_constraint(Constraint::Parent {
                driver,
                driven,
                offset: Transform::from_translation(DVec3::Y),
            })
            .unwrap();
        scene
            .set_local_transform(driver, Transform::from_translation(DVec3::new(3.0, 0.0, 0.0)))
            .unwrap();
        assert!(position(&scene, driven).abs_diff_eq(DVec3::new(3.0, 1.0, 0.0), TOL));
        assert_eq!(scene.constraints_on(driven).len(), 1);
    }

    #[test]
    fn test_constraint_cycle_is_reported() {
        let mut scene = MemoryScene::new();
        let a = scene.create_node("a", NodeKind::Group, None).unwrap();
        let b = scene.create_node("b", NodeKind::Group, None).unwrap();
        let offset = Transform::IDENTITY;
        scene.add_constraint(Constraint::Parent { driver: a, driven: b, offset }).unwrap();
        scene.add_constraint(Constraint::Parent { driver: b, driven: a, offset }).unwrap();
        assert!(matches!(scene.world_matrix(a), Err(SceneError::EvaluationCycle(_))));
    }

    #[test]
    fn test_delete_removes_subtree_and_constraints() {
        let mut scene = MemoryScene::new();
        let [a, b, c] = arm(&mut scene);
        let ctrl = scene.create_node("ctrl", NodeKind::Curve, None).unwrap();
        scene
            .add_constraint(Constraint::Orient {
                driver: ctrl,
                driven: c,
                offset: DQuat::IDENTITY,
            })
            .unwrap();
        scene.delete_node(b).unwrap();
        assert!(scene.contains(a));
        assert!(!scene.contains(b));
        assert!(!scene.contains(c));
        assert_eq!(scene.constraint_count(), 0);
        assert!(scene.children(a).unwrap().is_empty());
    }

    #[test]
    fn test_space_constraint_switches_frame() {
        let mut scene = MemoryScene::new();
        let anchor = scene.create_node("anchor", NodeKind::Group, None).unwrap();
        scene
            .set_local_transform(anchor, Transform::from_translation(DVec3::new(0.0, 5.0, 0.0)))
            .unwrap();
        let space = scene.create_node("space", NodeKind::Group, None).unwrap();
        let ctrl = scene.create_node("ctrl", NodeKind::Curve, Some(space)).unwrap();
        scene
            .add_attribute(ctrl, "parentSpace", AttributeKind::Enum(vec!["world".into(), "anchor".into()]), 1.0)
            .unwrap();
        scene
            .add_constraint(Constraint::Space(SpaceConstraint {
                driven: space,
                parent: SpaceSource {
                    candidates: vec![None, Some(anchor)],
                    selector: Some((ctrl, "parentSpace".into())),
                    default: 0,
                },
                upright: SpaceSource::fixed(None),
            }))
            .unwrap();
        assert!(position(&scene, ctrl).abs_diff_eq(DVec3::new(0.0, 5.0, 0.0), TOL));
        scene.set_attribute(ctrl, "parentSpace", 0.0).unwrap();
        assert!(position(&scene, ctrl).abs_diff_eq(DVec3::ZERO, TOL));
        scene.set_attribute(ctrl, "parentSpace", 7.0).unwrap();
        assert!(position(&scene, ctrl).abs_diff_eq(DVec3::ZERO, TOL));
    }

    #[test]
    fn test_two_bone_ik_reaches_effector() {
        let mut scene = MemoryScene::new();
        let chain = arm(&mut scene);
        let effector = scene.create_node("ik", NodeKind::Curve, None).unwrap();
        scene
            .set_local_transform(effector, Transform::from_translation(DVec3::new(1.2, 0.0, 0.0)))
            .unwrap();
        scene
            .add_constraint(Constraint::Ik(IkSolver {
                chain: chain.to_vec(),
                effector,
                pole: None,
                bend_hint: DVec3::Y,
                twist: None,
                method: IkMethod::TwoBone,
            }))
            .unwrap();
        assert!(position(&scene, chain[2]).abs_diff_eq(DVec3::new(1.2, 0.0, 0.0), TOL));
        let elbow = position(&scene, chain[1]);
        assert!((elbow.length() - 1.0).abs() < TOL);
        assert!(elbow.y > 0.0);
    }

    #[test]
    fn test_chain_ik_reaches_effector() {
        let mut scene = MemoryScene::new();
        let a = joint(&mut scene, "a", None, DVec3::ZERO);
        let b = joint(&mut scene, "b", Some(a), DVec3::X);
        let c = joint(&mut scene, "c", Some(b), DVec3::X);
        let d = joint(&mut scene, "d", Some(c), DVec3::X);
        let effector = scene.create_node("ik", NodeKind::Curve, None).unwrap();
        scene
            .set_local_transform(effector, Transform::from_translation(DVec3::new(1.5, 1.5, 0.0)))
            .unwrap();
        scene
            .add_constraint(Constraint::Ik(IkSolver {
                chain: vec![a, b, c, d],
                effector,
                pole: None,
                bend_hint: DVec3::Y,
                twist: None,
                method: IkMethod::Chain,
            }))
            .unwrap();
        assert!(position(&scene, d).distance(DVec3::new(1.5, 1.5, 0.0)) < 1e-3);
    }

    #[test]
    fn test_stretch_reach_extends_chain() {
        let mut scene = MemoryScene::new();
        let chain = arm(&mut scene);
        let effector = scene.create_node("ik", NodeKind::Curve, None).unwrap();
        scene
            .set_local_transform(effector, Transform::from_translation(DVec3::new(3.0, 0.0, 0.0)))
            .unwrap();
        let params = StretchParams::enabled();
        for joint in &chain[..2] {
            scene
                .add_constraint(Constraint::Stretch(StretchDriver {
                    driven: *joint,
                    from: MeasurePoint::Origin(chain[0]),
                    to: MeasurePoint::Node(effector),
                    rest_length: 2.0,
                    reference: None,
                    axis: Axis::X,
                    mode: StretchMode::Reach,
                    params: params.clone(),
                }))
                .unwrap();
        }
        scene
            .add_constraint(Constraint::Ik(IkSolver {
                chain: chain.to_vec(),
                effector,
                pole: None,
                bend_hint: DVec3::Y,
                twist: None,
                method: IkMethod::TwoBone,
            }))
            .unwrap();
        assert!(position(&scene, chain[2]).abs_diff_eq(DVec3::new(3.0, 0.0, 0.0), TOL));
        let scale = world_transform(&scene, chain[0]).unwrap().scale;
        assert!(scale.abs_diff_eq(DVec3::new(1.5, 1.0 / 1.5, 1.0 / 1.5), TOL));

        scene
            .set_local_transform(effector, Transform::from_translation(DVec3::new(1.0, 0.0, 0.0)))
            .unwrap();
        let scale = world_transform(&scene, chain[0]).unwrap().scale;
        assert!(scale.abs_diff_eq(DVec3::ONE, TOL));
    }
}
