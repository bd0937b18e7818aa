//! Rig component data model.
//!
//! A component is one reusable piece of a control rig: a main control plus
//! kind-specific secondary controls, a target (or chain of targets) in the
//! skeleton, and references to the components providing its parent and
//! upright spaces.

mod generated;
mod params;

pub use generated::{ControlRole, GeneratedComponent, GeneratedControl};
pub use params::{
    AimFkParams, ChainParams, ComplexIkParams, IkParams, KindParams, LegIkParams, MultiFkParams,
    PoleParams, ShapeOverride, SpineIkParams, StandardIkParams, StretchParams,
};

pub(crate) use params::{default_pole_distance, positive};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::curve::{ControlColor, ControlShape, CurveGeometry};
use crate::error::{ChainRequirement, RigError, RigResult};
use crate::transform::Axis;

// =============================================================================
// Component kind
// =============================================================================

/// The closed catalog of component kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// Single control, optional target, translation and rotation.
    Basic,
    /// Like basic, also drives scale.
    Scale,
    /// Single forward-kinematics control.
    Fk,
    /// Forward-kinematics chain, one control per joint.
    MultiFk,
    /// FK control whose target aims at a secondary control.
    AimFk,
    /// Three-joint IK without a pole control.
    SimpleIk,
    /// Three-joint IK with a pole control.
    StandardIk,
    /// Standard IK plus a base control driving the chain root.
    ComplexIk,
    /// Hip, knee, ankle and ball with a pole and a ball control.
    LegIk,
    /// Iterative IK over a spine with base and end controls.
    SpineIk,
    /// Iterative IK over any chain of three or more joints.
    MultiIk,
}

impl ComponentKind {
    pub fn all() -> &'static [ComponentKind] {
        &[
            ComponentKind::Basic,
            ComponentKind::Scale,
            ComponentKind::Fk,
            ComponentKind::MultiFk,
            ComponentKind::AimFk,
            ComponentKind::SimpleIk,
            ComponentKind::StandardIk,
            ComponentKind::ComplexIk,
            ComponentKind::LegIk,
            ComponentKind::SpineIk,
            ComponentKind::MultiIk,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::Basic => "basic",
            ComponentKind::Scale => "scale",
            ComponentKind::Fk => "fk",
            ComponentKind::MultiFk => "multi_fk",
            ComponentKind::AimFk => "aim_fk",
            ComponentKind::SimpleIk => "simple_ik",
            ComponentKind::StandardIk => "standard_ik",
            ComponentKind::ComplexIk => "complex_ik",
            ComponentKind::LegIk => "leg_ik",
            ComponentKind::SpineIk => "spine_ik",
            ComponentKind::MultiIk => "multi_ik",
        }
    }

    /// Joints the kind needs in `bind_targets`.
    pub fn chain_requirement(&self) -> ChainRequirement {
        match self {
            ComponentKind::Basic | ComponentKind::Scale | ComponentKind::Fk | ComponentKind::AimFk => {
                ChainRequirement::None
            }
            ComponentKind::MultiFk => ChainRequirement::AtLeast(1),
            ComponentKind::SimpleIk | ComponentKind::StandardIk | ComponentKind::ComplexIk => {
                ChainRequirement::Exactly(3)
            }
            ComponentKind::LegIk => ChainRequirement::Exactly(4),
            ComponentKind::SpineIk | ComponentKind::MultiIk => ChainRequirement::AtLeast(3),
        }
    }

    pub fn is_chain(&self) -> bool {
        self.chain_requirement() != ChainRequirement::None
    }

    pub fn is_ik(&self) -> bool {
        matches!(
            self,
            ComponentKind::SimpleIk
                | ComponentKind::StandardIk
                | ComponentKind::ComplexIk
                | ComponentKind::LegIk
                | ComponentKind::SpineIk
                | ComponentKind::MultiIk
        )
    }

    /// Kinds solved analytically on three joints.
    pub fn is_two_bone(&self) -> bool {
        matches!(
            self,
            ComponentKind::SimpleIk
                | ComponentKind::StandardIk
                | ComponentKind::ComplexIk
                | ComponentKind::LegIk
        )
    }

    /// Single-target kinds that cannot bind without a target.
    pub fn requires_target(&self) -> bool {
        matches!(self, ComponentKind::Fk | ComponentKind::AimFk)
    }

    pub fn supports_stretch(&self) -> bool {
        self.is_chain()
    }

    pub fn default_shape(&self) -> ControlShape {
        match self {
            ComponentKind::SimpleIk
            | ComponentKind::StandardIk
            | ComponentKind::ComplexIk
            | ComponentKind::LegIk
            | ComponentKind::MultiIk => ControlShape::Cube,
            _ => ControlShape::Circle,
        }
    }

    pub fn default_scale(&self) -> f64 {
        match self {
            ComponentKind::SpineIk => 2.0,
            _ => 1.0,
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ComponentKind {
    type Err = RigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ComponentKind::all()
            .iter()
            .find(|kind| kind.as_str() == s)
            .copied()
            .ok_or_else(|| RigError::validation(format!("unknown component kind '{}'", s)))
    }
}

// =============================================================================
// Space references
// =============================================================================

/// A parent or upright space: the world origin or another component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum SpaceRef {
    #[default]
    World,
    Component(String),
}

impl SpaceRef {
    pub fn component(name: impl Into<String>) -> Self {
        SpaceRef::Component(name.into())
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            SpaceRef::World => None,
            SpaceRef::Component(name) => Some(name),
        }
    }
}

impl From<Option<String>> for SpaceRef {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(name) => SpaceRef::Component(name),
            None => SpaceRef::World,
        }
    }
}

impl From<SpaceRef> for Option<String> {
    fn from(value: SpaceRef) -> Self {
        match value {
            SpaceRef::World => None,
            SpaceRef::Component(name) => Some(name),
        }
    }
}

impl fmt::Display for SpaceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpaceRef::World => write!(f, "world"),
            SpaceRef::Component(name) => write!(f, "{}", name),
        }
    }
}

// =============================================================================
// Component
// =============================================================================

/// Attributes shared by every component kind.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentBase {
    pub name: String,
    /// Single scene node driven by non-chain kinds.
    pub target: Option<String>,
    pub parent_space: SpaceRef,
    pub upright_space: SpaceRef,
    pub space_switch_enabled: bool,
    /// Extra switchable spaces, by component name.
    pub space_candidates: Vec<String>,
    pub control_shape: ControlShape,
    pub control_scale: f64,
    pub control_color: ControlColor,
    pub aim_axis: Axis,
    pub enabled: bool,
    pub use_custom_curve: bool,
    /// Saved control geometry keyed by control role.
    pub custom_geometry: BTreeMap<String, CurveGeometry>,
}

/// A component: shared attributes plus the kind-specific parameter set.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub base: ComponentBase,
    pub params: KindParams,
}

impl Component {
    /// Creates a component with the kind's default look and parameters.
    pub fn new(name: impl Into<String>, kind: ComponentKind) -> Self {
        Self {
            base: ComponentBase {
                name: name.into(),
                target: None,
                parent_space: SpaceRef::World,
                upright_space: SpaceRef::World,
                space_switch_enabled: false,
                space_candidates: Vec::new(),
                control_shape: kind.default_shape(),
                control_scale: kind.default_scale(),
                control_color: ControlColor::default(),
                aim_axis: Axis::default(),
                enabled: true,
                use_custom_curve: false,
                custom_geometry: BTreeMap::new(),
            },
            params: KindParams::for_kind(kind),
        }
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn kind(&self) -> ComponentKind {
        self.params.kind()
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.base.target = Some(target.into());
        self
    }

    pub fn with_parent_space(mut self, space: SpaceRef) -> Self {
        self.base.parent_space = space;
        self
    }

    pub fn with_upright_space(mut self, space: SpaceRef) -> Self {
        self.base.upright_space = space;
        self
    }

    pub fn with_space_switch(mut self, enabled: bool) -> Self {
        self.base.space_switch_enabled = enabled;
        self
    }

    pub fn with_space_candidates<I, S>(mut self, candidates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base.space_candidates = candidates.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_shape(mut self, shape: ControlShape) -> Self {
        self.base.control_shape = shape;
        self
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.base.control_scale = scale;
        self
    }

    pub fn with_color(mut self, color: ControlColor) -> Self {
        self.base.control_color = color;
        self
    }

    pub fn with_aim_axis(mut self, axis: Axis) -> Self {
        self.base.aim_axis = axis;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.base.enabled = enabled;
        self
    }

    pub fn with_custom_curve(mut self, enabled: bool) -> Self {
        self.base.use_custom_curve = enabled;
        self
    }

    pub fn with_params(mut self, params: KindParams) -> Self {
        self.params = params;
        self
    }

    /// Sets the chain joints. Ignored by single-target kinds.
    pub fn with_bind_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Some(chain) = self.params.chain_mut() {
            chain.bind_targets = targets.into_iter().map(Into::into).collect();
        }
        self
    }

    pub fn with_stretch(mut self, stretch: StretchParams) -> Self {
        if let Some(chain) = self.params.chain_mut() {
            chain.stretch = stretch;
        }
        self
    }

    pub fn with_leaf_joint(mut self, leaf: bool) -> Self {
        if let Some(chain) = self.params.chain_mut() {
            chain.leaf_joint = leaf;
        }
        self
    }

    pub fn chain(&self) -> Option<&ChainParams> {
        self.params.chain()
    }

    /// Scene node names this component drives, root first.
    pub fn targets(&self) -> Vec<String> {
        match self.params.chain() {
            Some(chain) => chain.bind_targets.clone(),
            None => self.base.target.iter().cloned().collect(),
        }
    }

    pub fn is_leaf_mode(&self) -> bool {
        self.chain().is_some_and(|chain| chain.leaf_joint)
    }

    /// Component names this component's spaces depend on.
    pub fn space_references(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for name in self
            .base
            .parent_space
            .name()
            .into_iter()
            .chain(self.base.upright_space.name())
            .chain(self.base.space_candidates.iter().map(String::as_str))
        {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names
    }

    /// Checks the component on its own, without the graph.
    pub fn validate(&self) -> RigResult<()> {
        let name = &self.base.name;
        if name.is_empty() {
            return Err(RigError::validation("component name must not be empty"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(RigError::validation(format!(
                "component name '{}' may only contain letters, digits, '_' and '-'",
                name
            )));
        }
        positive(name, "control_scale", self.base.control_scale)?;
        if !self.base.control_color.is_valid() {
            return Err(RigError::validation(format!(
                "component '{}' control_color channels must be within [0, 1]",
                name
            )));
        }
        if self.kind().is_chain() && self.base.target.is_some() {
            return Err(RigError::validation(format!(
                "component '{}' is a {} chain; use bind_targets instead of target",
                name,
                self.kind()
            )));
        }
        if self.base.target.as_deref() == Some("") {
            return Err(RigError::validation(format!(
                "component '{}' has an empty target name",
                name
            )));
        }
        self.params.validate(name)
    }
}
