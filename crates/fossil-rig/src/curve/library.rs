//! Persistent library of user-authored control shapes.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{ControlShape, CurveError, CurveGeometry};

const LIBRARY_VERSION: u32 = 1;

/// Named user shapes, stored as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShapeLibrary {
    version: u32,
    #[serde(default)]
    shapes: BTreeMap<String, CurveGeometry>,
}

impl Default for ShapeLibrary {
    fn default() -> Self {
        Self {
            version: LIBRARY_VERSION,
            shapes: BTreeMap::new(),
        }
    }
}

impl ShapeLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a library file. A missing file yields an empty library.
    pub fn load(path: &Path) -> Result<Self, CurveError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "shape library not found, starting empty");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| CurveError::Io(format!("{}: {}", path.display(), e)))?;
        let library: ShapeLibrary =
            serde_json::from_str(&text).map_err(|e| CurveError::Parse(e.to_string()))?;
        if library.version != LIBRARY_VERSION {
            return Err(CurveError::Parse(format!(
                "unsupported shape library version {}",
                library.version
            )));
        }
        Ok(library)
    }

    pub fn save(&self, path: &Path) -> Result<(), CurveError> {
        let text =
            serde_json::to_string_pretty(self).map_err(|e| CurveError::Parse(e.to_string()))?;
        std::fs::write(path, text).map_err(|e| CurveError::Io(format!("{}: {}", path.display(), e)))
    }

    /// Adds or replaces a shape. Built-in preset names are reserved.
    pub fn add(&mut self, name: &str, geometry: CurveGeometry) -> Result<(), CurveError> {
        if name.is_empty() || name.contains(':') {
            return Err(CurveError::InvalidShape(name.to_string()));
        }
        if ControlShape::is_builtin_name(name) {
            return Err(CurveError::ReservedName(name.to_string()));
        }
        self.shapes.insert(name.to_string(), geometry);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<CurveGeometry> {
        self.shapes.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&CurveGeometry> {
        self.shapes.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.shapes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::CurveData;
    use pretty_assertions::assert_eq;

    fn paw() -> CurveGeometry {
        CurveGeometry::new(vec![CurveData::linear(vec![
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.5],
            [0.0, 0.0, 1.0],
        ])])
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let library = ShapeLibrary::load(&dir.path().join("shapes.json")).unwrap();
        assert!(library.is_empty());
    }

    #[test]
    fn test_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shapes.json");
        let mut library = ShapeLibrary::new();
        library.add("paw", paw()).unwrap();
        library.save(&path).unwrap();

        let loaded = ShapeLibrary::load(&path).unwrap();
        assert_eq!(loaded, library);
        assert_eq!(loaded.names().collect::<Vec<_>>(), vec!["paw"]);
    }

    #[test]
    fn test_builtin_names_reserved() {
        let mut library = ShapeLibrary::new();
        assert_eq!(
            library.add("cube", paw()),
            Err(CurveError::ReservedName("cube".into()))
        );
        assert_eq!(
            library.add("default", paw()),
            Err(CurveError::ReservedName("default".into()))
        );
        assert!(library.add("", paw()).is_err());
    }

    #[test]
    fn test_remove() {
        let mut library = ShapeLibrary::new();
        library.add("paw", paw()).unwrap();
        assert!(library.remove("paw").is_some());
        assert!(library.get("paw").is_none());
        assert!(library.remove("paw").is_none());
    }
}
