//! Error and warning types for rig construction and lifecycle operations.

use thiserror::Error;

use crate::component::ComponentKind;
use crate::rig::LifecycleState;
use crate::scene::{Frame, NodeId};

/// Convenience alias used throughout the crate.
pub type RigResult<T> = Result<T, RigError>;

/// Top-level error for every fallible rig operation.
///
/// Structural errors (`Validation`, `Reference`, `Cycle`) are raised by the
/// mutating graph call and leave the graph unchanged. `Bind` and `Bake` errors
/// leave the rig in the lifecycle state it had before the call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RigError {
    /// Duplicate name or malformed parameters.
    #[error("validation error: {0}")]
    Validation(String),
    /// Dangling or forbidden reference to a component or scene node.
    #[error("reference error: {0}")]
    Reference(String),
    /// A space reference would make a component its own space ancestor.
    #[error("space cycle: {}", .path.join(" -> "))]
    Cycle {
        /// Component names along the cycle, first and last are equal.
        path: Vec<String>,
    },
    /// Target topology mismatch or target already driven.
    #[error(transparent)]
    Bind(#[from] BindError),
    /// Bake could not fit control values.
    #[error(transparent)]
    Bake(#[from] BakeError),
    /// The host scene rejected an operation.
    #[error(transparent)]
    Scene(#[from] SceneError),
    /// The rig document could not be read or written.
    #[error("document error: {0}")]
    Document(String),
}

impl RigError {
    pub(crate) fn validation(message: impl Into<String>) -> Self {
        RigError::Validation(message.into())
    }

    pub(crate) fn reference(message: impl Into<String>) -> Self {
        RigError::Reference(message.into())
    }

    /// Short machine-readable category name.
    pub fn category(&self) -> &'static str {
        match self {
            RigError::Validation(_) => "validation",
            RigError::Reference(_) => "reference",
            RigError::Cycle { .. } => "cycle",
            RigError::Bind(_) => "bind",
            RigError::Bake(_) => "bake",
            RigError::Scene(_) => "scene",
            RigError::Document(_) => "document",
        }
    }
}

/// Chain length a component kind needs from its bind targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainRequirement {
    /// No chain; the component uses the single optional target.
    None,
    /// Exactly this many joints.
    Exactly(usize),
    /// At least this many joints.
    AtLeast(usize),
}

impl ChainRequirement {
    /// Returns true if `count` joints satisfy the requirement.
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            ChainRequirement::None => true,
            ChainRequirement::Exactly(n) => count == n,
            ChainRequirement::AtLeast(n) => count >= n,
        }
    }
}

impl std::fmt::Display for ChainRequirement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainRequirement::None => write!(f, "no chain"),
            ChainRequirement::Exactly(n) => write!(f, "exactly {} joints", n),
            ChainRequirement::AtLeast(n) => write!(f, "at least {} joints", n),
        }
    }
}

/// Errors raised while attaching controls to a target skeleton.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("cannot {operation} while the rig is {state}")]
    InvalidState {
        operation: &'static str,
        state: LifecycleState,
    },
    #[error("component '{component}' ({kind}) needs {required}, found {found}")]
    ChainLength {
        component: String,
        kind: ComponentKind,
        required: ChainRequirement,
        found: usize,
    },
    #[error("component '{component}' has no target to drive")]
    MissingTarget { component: String },
    #[error("component '{component}' target '{target}' does not exist in the scene")]
    UnknownTarget { component: String, target: String },
    #[error("component '{component}': '{child}' is not a child of '{parent}'")]
    BrokenChain {
        component: String,
        parent: String,
        child: String,
    },
    #[error("component '{component}': target '{target}' is already driven")]
    AlreadyDriven { component: String, target: String },
}

/// Errors raised while fitting source animation onto controls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BakeError {
    #[error("cannot bake while the rig is {state}")]
    InvalidState { state: LifecycleState },
    #[error("component '{component}' selects space {index} at frame {frame}, which has no candidate")]
    NoCandidate {
        component: String,
        frame: Frame,
        index: usize,
    },
    #[error("component '{component}' cannot be fitted at frame {frame}: {reason}")]
    Unsolvable {
        component: String,
        frame: Frame,
        reason: String,
    },
    #[error("bake cancelled at frame {frame}")]
    Cancelled { frame: Frame },
}

/// Errors reported by a host scene implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SceneError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    #[error("unknown constraint {0}")]
    UnknownConstraint(u64),
    #[error("node {node} has no attribute '{attribute}'")]
    UnknownAttribute { node: NodeId, attribute: String },
    #[error("node {node} already has an attribute '{attribute}'")]
    DuplicateAttribute { node: NodeId, attribute: String },
    #[error("node {0} is not a curve")]
    NotACurve(NodeId),
    #[error("evaluation cycle through node {0}")]
    EvaluationCycle(NodeId),
    #[error("cannot parent node {child} under {parent}")]
    InvalidParent { child: NodeId, parent: NodeId },
}

/// Warning codes for non-fatal regenerate problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningCode {
    /// W101: Declared space candidate no longer exists and was dropped.
    PrunedCandidate,
    /// W102: Selector key pointed at a pruned candidate and now selects world.
    KeyFellBackToWorld,
    /// W103: Declared parent or upright space is not generated; world is used.
    SpaceFellBackToWorld,
    /// W104: Library shape is unknown; the default shape is used.
    UnknownShape,
    /// W105: Component is disabled and was skipped.
    ComponentDisabled,
}

impl WarningCode {
    /// Returns the warning code string (e.g., "W101").
    pub fn code(&self) -> &'static str {
        match self {
            WarningCode::PrunedCandidate => "W101",
            WarningCode::KeyFellBackToWorld => "W102",
            WarningCode::SpaceFellBackToWorld => "W103",
            WarningCode::UnknownShape => "W104",
            WarningCode::ComponentDisabled => "W105",
        }
    }
}

impl std::fmt::Display for WarningCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A non-fatal problem found while regenerating a rig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegenerateWarning {
    /// The warning code.
    pub code: WarningCode,
    /// Component the warning belongs to.
    pub component: String,
    /// Human-readable message.
    pub message: String,
}

impl RegenerateWarning {
    /// Creates a new regenerate warning.
    pub fn new(code: WarningCode, component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            component: component.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for RegenerateWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.code, self.component, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_display_joins_path() {
        let err = RigError::Cycle {
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(err.to_string(), "space cycle: a -> b -> a");
        assert_eq!(err.category(), "cycle");
    }

    #[test]
    fn test_chain_requirement_accepts() {
        assert!(ChainRequirement::Exactly(4).accepts(4));
        assert!(!ChainRequirement::Exactly(4).accepts(3));
        assert!(ChainRequirement::AtLeast(3).accepts(7));
        assert!(!ChainRequirement::AtLeast(3).accepts(2));
        assert!(ChainRequirement::None.accepts(0));
    }

    #[test]
    fn test_bind_error_converts() {
        let err: RigError = BindError::MissingTarget {
            component: "hand_l".into(),
        }
        .into();
        assert_eq!(err.category(), "bind");
        assert!(err.to_string().contains("hand_l"));
    }

    #[test]
    fn test_warning_display() {
        let warning = RegenerateWarning::new(WarningCode::PrunedCandidate, "arm", "dropped 'chest'");
        assert_eq!(warning.to_string(), "W101 [arm]: dropped 'chest'");
    }
}
