//! Control curve shapes, procedural geometry and the user shape library.

mod library;
mod presets;

pub use library::ShapeLibrary;

use std::fmt;
use std::str::FromStr;

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::SceneError;
use crate::scene::{NodeId, Scene};
use crate::transform::{shortest_arc, Axis};

/// Errors from shape parsing and the shape library.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CurveError {
    #[error("invalid control shape '{0}'")]
    InvalidShape(String),
    #[error("unknown library shape '{0}'")]
    UnknownLibraryShape(String),
    #[error("'{0}' is a built-in shape name")]
    ReservedName(String),
    #[error("shape library I/O error: {0}")]
    Io(String),
    #[error("shape library parse error: {0}")]
    Parse(String),
}

// =============================================================================
// Geometry
// =============================================================================

/// One NURBS curve: control points, knot vector and degree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurveData {
    pub cvs: Vec<[f64; 3]>,
    pub knots: Vec<f64>,
    pub degree: u32,
}

impl CurveData {
    /// Degree-1 curve through `points` with a uniform knot vector.
    pub fn linear(points: Vec<[f64; 3]>) -> Self {
        let knots = (0..points.len()).map(|i| i as f64).collect();
        Self {
            cvs: points,
            knots,
            degree: 1,
        }
    }
}

/// Geometry of a control: one or more curves sharing a transform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CurveGeometry {
    pub curves: Vec<CurveData>,
}

impl CurveGeometry {
    pub fn new(curves: Vec<CurveData>) -> Self {
        Self { curves }
    }

    pub fn is_empty(&self) -> bool {
        self.curves.iter().all(|c| c.cvs.is_empty())
    }

    pub fn cv_count(&self) -> usize {
        self.curves.iter().map(|c| c.cvs.len()).sum()
    }

    /// Rotates then uniformly scales every control point.
    pub fn transformed(&self, rotation: DQuat, scale: f64) -> Self {
        let curves = self
            .curves
            .iter()
            .map(|curve| CurveData {
                cvs: curve
                    .cvs
                    .iter()
                    .map(|cv| (rotation * DVec3::from_array(*cv) * scale).to_array())
                    .collect(),
                knots: curve.knots.clone(),
                degree: curve.degree,
            })
            .collect();
        Self { curves }
    }
}

// =============================================================================
// Shape presets
// =============================================================================

/// Named control shape: a built-in preset or a user library entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ControlShape {
    #[default]
    Circle,
    Square,
    Cube,
    Star,
    Cross,
    Triangle,
    Diamond,
    Sphere,
    Arrow,
    /// No visible geometry.
    None,
    /// User shape stored in the shape library.
    Library(String),
}

impl ControlShape {
    /// All built-in presets.
    pub fn builtin() -> &'static [ControlShape] {
        &[
            ControlShape::Circle,
            ControlShape::Square,
            ControlShape::Cube,
            ControlShape::Star,
            ControlShape::Cross,
            ControlShape::Triangle,
            ControlShape::Diamond,
            ControlShape::Sphere,
            ControlShape::Arrow,
            ControlShape::None,
        ]
    }

    pub fn is_builtin_name(name: &str) -> bool {
        name == "default"
            || Self::builtin()
                .iter()
                .any(|shape| shape.to_string() == name)
    }
}

impl fmt::Display for ControlShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlShape::Circle => write!(f, "circle"),
            ControlShape::Square => write!(f, "square"),
            ControlShape::Cube => write!(f, "cube"),
            ControlShape::Star => write!(f, "star"),
            ControlShape::Cross => write!(f, "cross"),
            ControlShape::Triangle => write!(f, "triangle"),
            ControlShape::Diamond => write!(f, "diamond"),
            ControlShape::Sphere => write!(f, "sphere"),
            ControlShape::Arrow => write!(f, "arrow"),
            ControlShape::None => write!(f, "none"),
            ControlShape::Library(name) => write!(f, "library:{}", name),
        }
    }
}

impl FromStr for ControlShape {
    type Err = CurveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let shape = match s {
            "default" | "circle" => ControlShape::Circle,
            "square" => ControlShape::Square,
            "cube" => ControlShape::Cube,
            "star" => ControlShape::Star,
            "cross" => ControlShape::Cross,
            "triangle" => ControlShape::Triangle,
            "diamond" => ControlShape::Diamond,
            "sphere" => ControlShape::Sphere,
            "arrow" => ControlShape::Arrow,
            "none" => ControlShape::None,
            other => match other.strip_prefix("library:") {
                Some(name) if !name.is_empty() => ControlShape::Library(name.to_string()),
                _ => return Err(CurveError::InvalidShape(s.to_string())),
            },
        };
        Ok(shape)
    }
}

impl TryFrom<String> for ControlShape {
    type Error = CurveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ControlShape> for String {
    fn from(shape: ControlShape) -> Self {
        shape.to_string()
    }
}

/// RGB draw color, each channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ControlColor {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl Default for ControlColor {
    fn default() -> Self {
        Self::BLUE
    }
}

impl ControlColor {
    pub const BLUE: Self = Self { r: 0.0, g: 0.0, b: 1.0 };
    pub const RED: Self = Self { r: 1.0, g: 0.0, b: 0.0 };
    pub const YELLOW: Self = Self { r: 1.0, g: 1.0, b: 0.0 };

    /// Creates a color with channels clamped to `[0, 1]`.
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.r, self.g, self.b]
            .iter()
            .all(|c| (0.0..=1.0).contains(c))
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Builds control geometry from presets, the user library or saved edits.
#[derive(Debug, Clone, Default)]
pub struct CurveFactory {
    library: ShapeLibrary,
}

impl CurveFactory {
    pub fn new(library: ShapeLibrary) -> Self {
        Self { library }
    }

    pub fn library(&self) -> &ShapeLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut ShapeLibrary {
        &mut self.library
    }

    /// Builds geometry for one control.
    ///
    /// `custom` is returned verbatim when present. Otherwise the shape is
    /// authored with its normal on +Y, rotated so that normal follows `axis`
    /// and scaled uniformly by `scale`. An unknown library shape is an error;
    /// callers fall back to [`ControlShape::Circle`].
    pub fn build(
        &self,
        shape: &ControlShape,
        scale: f64,
        axis: Axis,
        custom: Option<&CurveGeometry>,
    ) -> Result<CurveGeometry, CurveError> {
        if let Some(custom) = custom {
            return Ok(custom.clone());
        }
        let unit = match shape {
            ControlShape::Library(name) => self
                .library
                .get(name)
                .cloned()
                .ok_or_else(|| CurveError::UnknownLibraryShape(name.clone()))?,
            builtin => presets::unit_geometry(builtin),
        };
        let rotation = shortest_arc(DVec3::Y, axis.vector());
        Ok(unit.transformed(rotation, scale))
    }
}

/// Reads the live geometry of a generated control.
pub fn capture(scene: &dyn Scene, node: NodeId) -> Result<CurveGeometry, SceneError> {
    scene.curve(node)
}
