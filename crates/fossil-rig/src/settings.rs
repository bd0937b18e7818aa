//! Engine configuration.
//!
//! Settings come from a JSON file (path in `FOSSIL_SETTINGS`) or defaults.
//! `FOSSIL_SHAPE_LIBRARY` overrides the shape library path.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::component::{default_pole_distance, Component, ComponentKind, KindParams};
use crate::curve::{ControlColor, ControlShape, CurveError, CurveFactory, ShapeLibrary};
use crate::scene::SolverSettings;

/// Environment variable naming the settings file.
pub const SETTINGS_ENV: &str = "FOSSIL_SETTINGS";
/// Environment variable naming the shape library file.
pub const SHAPE_LIBRARY_ENV: &str = "FOSSIL_SHAPE_LIBRARY";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Default look for newly created components of one kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShapeDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape: Option<ControlShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ControlColor>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RigSettings {
    /// Per-kind look overrides, keyed by kind name (e.g. "leg_ik").
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kind_defaults: BTreeMap<String, ShapeDefaults>,
    /// Pole distance given to new pole-vector components.
    #[serde(default = "default_pole_distance")]
    pub default_pole_distance: f64,
    #[serde(default = "default_ik_iterations")]
    pub ik_iterations: usize,
    #[serde(default = "default_ik_tolerance")]
    pub ik_tolerance: f64,
    /// Maximum distance between a baked control and its target.
    #[serde(default = "default_bake_tolerance")]
    pub bake_tolerance: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shape_library: Option<PathBuf>,
}

fn default_ik_iterations() -> usize {
    32
}

fn default_ik_tolerance() -> f64 {
    1e-6
}

fn default_bake_tolerance() -> f64 {
    1e-3
}

impl Default for RigSettings {
    fn default() -> Self {
        Self {
            kind_defaults: BTreeMap::new(),
            default_pole_distance: default_pole_distance(),
            ik_iterations: default_ik_iterations(),
            ik_tolerance: default_ik_tolerance(),
            bake_tolerance: default_bake_tolerance(),
            shape_library: None,
        }
    }
}

impl RigSettings {
    /// Reads and validates a settings file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings: RigSettings = serde_json::from_str(&text)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Settings from `FOSSIL_SETTINGS` (or defaults) with the
    /// `FOSSIL_SHAPE_LIBRARY` override applied.
    pub fn from_env() -> Result<Self, SettingsError> {
        let mut settings = match std::env::var_os(SETTINGS_ENV) {
            Some(path) => Self::load(Path::new(&path))?,
            None => Self::default(),
        };
        if let Some(path) = std::env::var_os(SHAPE_LIBRARY_ENV) {
            settings.shape_library = Some(PathBuf::from(path));
        }
        tracing::debug!(?settings.shape_library, "settings loaded");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        for (kind, defaults) in &self.kind_defaults {
            kind.parse::<ComponentKind>()
                .map_err(|_| SettingsError::Invalid(format!("unknown component kind '{}'", kind)))?;
            if let Some(scale) = defaults.scale {
                if !(scale.is_finite() && scale > 0.0) {
                    return Err(SettingsError::Invalid(format!(
                        "kind_defaults.{}.scale must be greater than zero",
                        kind
                    )));
                }
            }
        }
        for (field, value) in [
            ("default_pole_distance", self.default_pole_distance),
            ("ik_tolerance", self.ik_tolerance),
            ("bake_tolerance", self.bake_tolerance),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SettingsError::Invalid(format!(
                    "{} must be greater than zero",
                    field
                )));
            }
        }
        if self.ik_iterations == 0 {
            return Err(SettingsError::Invalid(
                "ik_iterations must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// A new component with the configured defaults for its kind.
    pub fn component(&self, name: impl Into<String>, kind: ComponentKind) -> Component {
        let mut component = Component::new(name, kind);
        if let Some(defaults) = self.kind_defaults.get(kind.as_str()) {
            if let Some(shape) = &defaults.shape {
                component.base.control_shape = shape.clone();
            }
            if let Some(scale) = defaults.scale {
                component.base.control_scale = scale;
            }
            if let Some(color) = defaults.color {
                component.base.control_color = color;
            }
        }
        match &mut component.params {
            KindParams::StandardIk(p) => p.pole.pole_distance = self.default_pole_distance,
            KindParams::ComplexIk(p) => p.pole.pole_distance = self.default_pole_distance,
            KindParams::LegIk(p) => p.pole.pole_distance = self.default_pole_distance,
            _ => {}
        }
        component
    }

    pub fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            ik_iterations: self.ik_iterations,
            ik_tolerance: self.ik_tolerance,
        }
    }

    /// Curve factory backed by the configured shape library.
    pub fn curve_factory(&self) -> Result<CurveFactory, CurveError> {
        let library = match &self.shape_library {
            Some(path) => ShapeLibrary::load(path)?,
            None => ShapeLibrary::new(),
        };
        Ok(CurveFactory::new(library))
    }
}
