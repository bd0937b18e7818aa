//! Handles to the scene nodes a component produced on regenerate.

use std::fmt;
use std::str::FromStr;

use glam::DVec3;

use super::ComponentKind;
use crate::error::RigError;
use crate::scene::{ConstraintId, NodeId};
use crate::space::ResolvedSpaces;
use crate::stretch::StretchPlan;

/// Stable name of a control within its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ControlRole {
    Main,
    Pole,
    Ball,
    Base,
    Aim,
    /// Per-joint control of a multi-FK chain.
    Child(usize),
}

impl fmt::Display for ControlRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlRole::Main => write!(f, "main"),
            ControlRole::Pole => write!(f, "pole"),
            ControlRole::Ball => write!(f, "ball"),
            ControlRole::Base => write!(f, "base"),
            ControlRole::Aim => write!(f, "aim"),
            ControlRole::Child(index) => write!(f, "child_{}", index),
        }
    }
}

impl FromStr for ControlRole {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(ControlRole::Main),
            "pole" => Ok(ControlRole::Pole),
            "ball" => Ok(ControlRole::Ball),
            "base" => Ok(ControlRole::Base),
            "aim" => Ok(ControlRole::Aim),
            other => other
                .strip_prefix("child_")
                .and_then(|index| index.parse().ok())
                .map(ControlRole::Child)
                .ok_or_else(|| RigError::validation(format!("unknown control role '{}'", s))),
        }
    }
}

/// A control curve and the buffer group holding its rest offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedControl {
    pub role: ControlRole,
    pub control: NodeId,
    pub buffer: NodeId,
}

/// Everything a component created in the scene.
///
/// Valid only while the owning rig is previewed or bound.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedComponent {
    pub name: String,
    pub kind: ComponentKind,
    /// Component root group.
    pub group: NodeId,
    /// Space node driven by the space constraint.
    pub space: NodeId,
    pub space_constraint: ConstraintId,
    pub spaces: ResolvedSpaces,
    /// Controls in creation order; parents come before children.
    pub controls: Vec<GeneratedControl>,
    /// Resolved bind targets.
    pub targets: Vec<NodeId>,
    /// Joints the controls are placed on and the IK solves over. Equal to
    /// `targets` unless the component is in leaf-joint mode.
    pub structural: Vec<NodeId>,
    pub stretch: Option<StretchPlan>,
    /// Bend direction in main-control space captured at rest.
    pub bend_hint: DVec3,
    /// Constraint records attaching the controls to the targets.
    pub bindings: Vec<ConstraintId>,
}

impl GeneratedComponent {
    pub fn control(&self, role: ControlRole) -> Option<&GeneratedControl> {
        self.controls.iter().find(|c| c.role == role)
    }

    /// The main control. Every generated component has one.
    pub fn main(&self) -> NodeId {
        self.control(ControlRole::Main)
            .map(|c| c.control)
            .unwrap_or(self.space)
    }

    pub fn is_bound(&self) -> bool {
        !self.bindings.is_empty()
    }

    /// Every node created for this component.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes = vec![self.group, self.space];
        for control in &self.controls {
            nodes.push(control.buffer);
            nodes.push(control.control);
        }
        nodes
    }
}
