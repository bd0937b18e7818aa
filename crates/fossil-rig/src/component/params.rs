//! Per-kind component parameter sets.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ComponentKind;
use crate::curve::{ControlColor, ControlShape};
use crate::error::{RigError, RigResult};

// =============================================================================
// Shared parameter blocks
// =============================================================================

/// Squash and stretch toggles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StretchParams {
    #[serde(default)]
    pub stretch_enabled: bool,
    #[serde(default)]
    pub squash_enabled: bool,
    /// Scales the volume-preserving squash. 1.0 preserves volume exactly.
    #[serde(default = "default_squash_coefficient")]
    pub squash_coefficient: f64,
    /// Multiplier on the measured length ratio.
    #[serde(default = "default_stretch_scale")]
    pub stretch_scale: f64,
    /// Lower bound on the stretch factor. Unset, multi-FK chains may shrink
    /// freely and IK chains only lengthen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stretch_min: Option<f64>,
}

impl Default for StretchParams {
    fn default() -> Self {
        Self {
            stretch_enabled: false,
            squash_enabled: false,
            squash_coefficient: default_squash_coefficient(),
            stretch_scale: default_stretch_scale(),
            stretch_min: None,
        }
    }
}

impl StretchParams {
    pub fn enabled() -> Self {
        Self {
            stretch_enabled: true,
            squash_enabled: true,
            ..Default::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.stretch_enabled || self.squash_enabled
    }
}

fn default_squash_coefficient() -> f64 {
    1.0
}

fn default_stretch_scale() -> f64 {
    1.0
}

/// Joint chain driven by a multi-target component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChainParams {
    /// Joint names, root first.
    #[serde(default)]
    pub bind_targets: Vec<String>,
    /// Targets are leaf joints; their parents form the solved chain.
    #[serde(default)]
    pub leaf_joint: bool,
    #[serde(default)]
    pub stretch: StretchParams,
}

/// Pole vector control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoleParams {
    #[serde(default = "default_pole_shape")]
    pub pole_shape: ControlShape,
    #[serde(default = "default_pole_scale")]
    pub pole_scale: f64,
    /// Multiplier on the chain's bend offset when placing the pole.
    #[serde(default = "default_pole_distance")]
    pub pole_distance: f64,
    /// Drive the bend plane from a twist attribute instead of a pole control.
    #[serde(default)]
    pub no_flip_knee: bool,
}

impl Default for PoleParams {
    fn default() -> Self {
        Self {
            pole_shape: default_pole_shape(),
            pole_scale: default_pole_scale(),
            pole_distance: default_pole_distance(),
            no_flip_knee: false,
        }
    }
}

fn default_pole_shape() -> ControlShape {
    ControlShape::Triangle
}

fn default_pole_scale() -> f64 {
    0.2
}

pub(crate) fn default_pole_distance() -> f64 {
    5.0
}

fn default_secondary_shape() -> ControlShape {
    ControlShape::Circle
}

fn default_secondary_scale() -> f64 {
    1.0
}

/// Per-child look override for multi-FK chains.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShapeOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<ControlShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ControlColor>,
}

// =============================================================================
// Kind parameter sets
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AimFkParams {
    #[serde(default = "default_aim_shape")]
    pub aim_shape: ControlShape,
    #[serde(default = "default_pole_scale")]
    pub aim_scale: f64,
    /// Distance of the aim control along the aim axis.
    #[serde(default = "default_pole_distance")]
    pub aim_distance: f64,
}

impl Default for AimFkParams {
    fn default() -> Self {
        Self {
            aim_shape: default_aim_shape(),
            aim_scale: default_pole_scale(),
            aim_distance: default_pole_distance(),
        }
    }
}

fn default_aim_shape() -> ControlShape {
    ControlShape::Sphere
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MultiFkParams {
    #[serde(default)]
    pub chain: ChainParams,
    #[serde(default = "default_secondary_shape")]
    pub child_shape: ControlShape,
    #[serde(default = "default_secondary_scale")]
    pub child_scale: f64,
    /// Overrides keyed by child index.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub child_overrides: BTreeMap<usize, ShapeOverride>,
}

impl Default for MultiFkParams {
    fn default() -> Self {
        Self {
            chain: ChainParams::default(),
            child_shape: default_secondary_shape(),
            child_scale: default_secondary_scale(),
            child_overrides: BTreeMap::new(),
        }
    }
}

/// Simple and multi IK: the chain only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IkParams {
    #[serde(default)]
    pub chain: ChainParams,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StandardIkParams {
    #[serde(default)]
    pub chain: ChainParams,
    #[serde(default)]
    pub pole: PoleParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComplexIkParams {
    #[serde(default)]
    pub chain: ChainParams,
    #[serde(default)]
    pub pole: PoleParams,
    #[serde(default = "default_secondary_shape")]
    pub base_shape: ControlShape,
    #[serde(default = "default_secondary_scale")]
    pub base_scale: f64,
}

impl Default for ComplexIkParams {
    fn default() -> Self {
        Self {
            chain: ChainParams::default(),
            pole: PoleParams::default(),
            base_shape: default_secondary_shape(),
            base_scale: default_secondary_scale(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LegIkParams {
    #[serde(default)]
    pub chain: ChainParams,
    #[serde(default)]
    pub pole: PoleParams,
    #[serde(default = "default_secondary_shape")]
    pub ball_shape: ControlShape,
    #[serde(default = "default_secondary_scale")]
    pub ball_scale: f64,
}

impl Default for LegIkParams {
    fn default() -> Self {
        Self {
            chain: ChainParams::default(),
            pole: PoleParams::default(),
            ball_shape: default_secondary_shape(),
            ball_scale: default_secondary_scale(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpineIkParams {
    #[serde(default)]
    pub chain: ChainParams,
    #[serde(default = "default_secondary_shape")]
    pub base_shape: ControlShape,
    #[serde(default = "default_secondary_scale")]
    pub base_scale: f64,
}

impl Default for SpineIkParams {
    fn default() -> Self {
        Self {
            chain: ChainParams::default(),
            base_shape: default_secondary_shape(),
            base_scale: default_secondary_scale(),
        }
    }
}

/// Kind-specific parameters; the variant determines the component kind.
#[derive(Debug, Clone, PartialEq)]
pub enum KindParams {
    Basic,
    Scale,
    Fk,
    AimFk(AimFkParams),
    MultiFk(MultiFkParams),
    SimpleIk(IkParams),
    StandardIk(StandardIkParams),
    ComplexIk(ComplexIkParams),
    LegIk(LegIkParams),
    SpineIk(SpineIkParams),
    MultiIk(IkParams),
}

impl KindParams {
    /// Default parameters for a kind.
    pub fn for_kind(kind: ComponentKind) -> Self {
        match kind {
            ComponentKind::Basic => KindParams::Basic,
            ComponentKind::Scale => KindParams::Scale,
            ComponentKind::Fk => KindParams::Fk,
            ComponentKind::AimFk => KindParams::AimFk(AimFkParams::default()),
            ComponentKind::MultiFk => KindParams::MultiFk(MultiFkParams::default()),
            ComponentKind::SimpleIk => KindParams::SimpleIk(IkParams::default()),
            ComponentKind::StandardIk => KindParams::StandardIk(StandardIkParams::default()),
            ComponentKind::ComplexIk => KindParams::ComplexIk(ComplexIkParams::default()),
            ComponentKind::LegIk => KindParams::LegIk(LegIkParams::default()),
            ComponentKind::SpineIk => KindParams::SpineIk(SpineIkParams::default()),
            ComponentKind::MultiIk => KindParams::MultiIk(IkParams::default()),
        }
    }

    pub fn kind(&self) -> ComponentKind {
        match self {
            KindParams::Basic => ComponentKind::Basic,
            KindParams::Scale => ComponentKind::Scale,
            KindParams::Fk => ComponentKind::Fk,
            KindParams::AimFk(_) => ComponentKind::AimFk,
            KindParams::MultiFk(_) => ComponentKind::MultiFk,
            KindParams::SimpleIk(_) => ComponentKind::SimpleIk,
            KindParams::StandardIk(_) => ComponentKind::StandardIk,
            KindParams::ComplexIk(_) => ComponentKind::ComplexIk,
            KindParams::LegIk(_) => ComponentKind::LegIk,
            KindParams::SpineIk(_) => ComponentKind::SpineIk,
            KindParams::MultiIk(_) => ComponentKind::MultiIk,
        }
    }

    pub fn chain(&self) -> Option<&ChainParams> {
        match self {
            KindParams::Basic | KindParams::Scale | KindParams::Fk | KindParams::AimFk(_) => None,
            KindParams::MultiFk(p) => Some(&p.chain),
            KindParams::SimpleIk(p) | KindParams::MultiIk(p) => Some(&p.chain),
            KindParams::StandardIk(p) => Some(&p.chain),
            KindParams::ComplexIk(p) => Some(&p.chain),
            KindParams::LegIk(p) => Some(&p.chain),
            KindParams::SpineIk(p) => Some(&p.chain),
        }
    }

    pub fn chain_mut(&mut self) -> Option<&mut ChainParams> {
        match self {
            KindParams::Basic | KindParams::Scale | KindParams::Fk | KindParams::AimFk(_) => None,
            KindParams::MultiFk(p) => Some(&mut p.chain),
            KindParams::SimpleIk(p) | KindParams::MultiIk(p) => Some(&mut p.chain),
            KindParams::StandardIk(p) => Some(&mut p.chain),
            KindParams::ComplexIk(p) => Some(&mut p.chain),
            KindParams::LegIk(p) => Some(&mut p.chain),
            KindParams::SpineIk(p) => Some(&mut p.chain),
        }
    }

    pub fn pole(&self) -> Option<&PoleParams> {
        match self {
            KindParams::StandardIk(p) => Some(&p.pole),
            KindParams::ComplexIk(p) => Some(&p.pole),
            KindParams::LegIk(p) => Some(&p.pole),
            _ => None,
        }
    }

    /// Serializes the parameter set; parameterless kinds give `null`.
    pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            KindParams::Basic | KindParams::Scale | KindParams::Fk => Ok(serde_json::Value::Null),
            KindParams::AimFk(p) => serde_json::to_value(p),
            KindParams::MultiFk(p) => serde_json::to_value(p),
            KindParams::SimpleIk(p) | KindParams::MultiIk(p) => serde_json::to_value(p),
            KindParams::StandardIk(p) => serde_json::to_value(p),
            KindParams::ComplexIk(p) => serde_json::to_value(p),
            KindParams::LegIk(p) => serde_json::to_value(p),
            KindParams::SpineIk(p) => serde_json::to_value(p),
        }
    }

    /// Parses the parameter set for `kind`. `null` yields the defaults.
    pub fn from_value(kind: ComponentKind, value: serde_json::Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::for_kind(kind));
        }
        let params = match kind {
            ComponentKind::Basic => {
                ensure_empty(&value)?;
                KindParams::Basic
            }
            ComponentKind::Scale => {
                ensure_empty(&value)?;
                KindParams::Scale
            }
            ComponentKind::Fk => {
                ensure_empty(&value)?;
                KindParams::Fk
            }
            ComponentKind::AimFk => KindParams::AimFk(serde_json::from_value(value)?),
            ComponentKind::MultiFk => KindParams::MultiFk(serde_json::from_value(value)?),
            ComponentKind::SimpleIk => KindParams::SimpleIk(serde_json::from_value(value)?),
            ComponentKind::StandardIk => KindParams::StandardIk(serde_json::from_value(value)?),
            ComponentKind::ComplexIk => KindParams::ComplexIk(serde_json::from_value(value)?),
            ComponentKind::LegIk => KindParams::LegIk(serde_json::from_value(value)?),
            ComponentKind::SpineIk => KindParams::SpineIk(serde_json::from_value(value)?),
            ComponentKind::MultiIk => KindParams::MultiIk(serde_json::from_value(value)?),
        };
        Ok(params)
    }

    /// Checks numeric parameter ranges.
    pub fn validate(&self, component: &str) -> RigResult<()> {
        if let Some(chain) = self.chain() {
            let mut seen = std::collections::BTreeSet::new();
            for target in &chain.bind_targets {
                if target.is_empty() {
                    return Err(RigError::validation(format!(
                        "component '{}' has an empty bind target name",
                        component
                    )));
                }
                if !seen.insert(target.as_str()) {
                    return Err(RigError::validation(format!(
                        "component '{}' lists bind target '{}' twice",
                        component, target
                    )));
                }
            }
            let coefficient = chain.stretch.squash_coefficient;
            if !coefficient.is_finite() || coefficient < 0.0 {
                return Err(RigError::validation(format!(
                    "component '{}' squash_coefficient must be a non-negative number, got {}",
                    component, coefficient
                )));
            }
            positive(component, "stretch_scale", chain.stretch.stretch_scale)?;
            if let Some(min) = chain.stretch.stretch_min {
                if !min.is_finite() || min < 0.0 {
                    return Err(RigError::validation(format!(
                        "component '{}' stretch_min must be a non-negative number, got {}",
                        component, min
                    )));
                }
            }
        }
        if let Some(pole) = self.pole() {
            positive(component, "pole_scale", pole.pole_scale)?;
            positive(component, "pole_distance", pole.pole_distance)?;
        }
        match self {
            KindParams::AimFk(p) => {
                positive(component, "aim_scale", p.aim_scale)?;
                positive(component, "aim_distance", p.aim_distance)?;
            }
            KindParams::MultiFk(p) => {
                positive(component, "child_scale", p.child_scale)?;
                for (index, child) in &p.child_overrides {
                    if let Some(scale) = child.scale {
                        positive(component, &format!("child_overrides[{}].scale", index), scale)?;
                    }
                }
            }
            KindParams::ComplexIk(p) => positive(component, "base_scale", p.base_scale)?,
            KindParams::SpineIk(p) => positive(component, "base_scale", p.base_scale)?,
            KindParams::LegIk(p) => positive(component, "ball_scale", p.ball_scale)?,
            _ => {}
        }
        Ok(())
    }
}

fn ensure_empty(value: &serde_json::Value) -> Result<(), serde_json::Error> {
    match value.as_object() {
        Some(map) if map.is_empty() => Ok(()),
        _ => Err(serde::de::Error::custom(
            "this component kind takes no parameters",
        )),
    }
}

pub(crate) fn positive(component: &str, field: &str, value: f64) -> RigResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(RigError::validation(format!(
            "component '{}' {} must be greater than zero, got {}",
            component, field, value
        )))
    }
}
