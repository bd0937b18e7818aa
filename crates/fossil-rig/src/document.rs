//! Versioned JSON rig document.
//!
//! A document stores a rig's name, bake-on-bind flag and components in UI
//! order. Generated state is never persisted; a loaded rig starts `Empty`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::component::{Component, ComponentBase, ComponentKind, KindParams, SpaceRef};
use crate::curve::{ControlColor, ControlShape, CurveGeometry};
use crate::error::{RigError, RigResult};
use crate::graph::ComponentGraph;
use crate::rig::Rig;
use crate::transform::Axis;

/// Current document schema version.
pub const DOCUMENT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RigDocument {
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub bake_on_bind: bool,
    #[serde(default)]
    pub components: Vec<ComponentRecord>,
}

/// One persisted component. Omitted look fields take the kind's defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComponentRecord {
    pub name: String,
    pub kind: ComponentKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default)]
    pub parent_space: SpaceRef,
    #[serde(default)]
    pub upright_space: SpaceRef,
    #[serde(default)]
    pub space_switch_enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub space_candidates: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_shape: Option<ControlShape>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_scale: Option<f64>,
    #[serde(default)]
    pub control_color: ControlColor,
    #[serde(default)]
    pub aim_axis: Axis,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub use_custom_curve: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_geometry: BTreeMap<String, CurveGeometry>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub kind_params: serde_json::Value,
}

fn default_enabled() -> bool {
    true
}

impl ComponentRecord {
    pub fn from_component(component: &Component) -> RigResult<Self> {
        let base = &component.base;
        let kind_params = component.params.to_value().map_err(|e| {
            RigError::Document(format!(
                "failed to serialize parameters of '{}': {}",
                base.name, e
            ))
        })?;
        Ok(Self {
            name: base.name.clone(),
            kind: component.kind(),
            target: base.target.clone(),
            parent_space: base.parent_space.clone(),
            upright_space: base.upright_space.clone(),
            space_switch_enabled: base.space_switch_enabled,
            space_candidates: base.space_candidates.clone(),
            control_shape: Some(base.control_shape.clone()),
            control_scale: Some(base.control_scale),
            control_color: base.control_color,
            aim_axis: base.aim_axis,
            enabled: base.enabled,
            use_custom_curve: base.use_custom_curve,
            custom_geometry: base.custom_geometry.clone(),
            kind_params,
        })
    }

    pub fn to_component(&self) -> RigResult<Component> {
        let params = KindParams::from_value(self.kind, self.kind_params.clone()).map_err(|e| {
            RigError::Document(format!("invalid kind_params for '{}': {}", self.name, e))
        })?;
        Ok(Component {
            base: ComponentBase {
                name: self.name.clone(),
                target: self.target.clone(),
                parent_space: self.parent_space.clone(),
                upright_space: self.upright_space.clone(),
                space_switch_enabled: self.space_switch_enabled,
                space_candidates: self.space_candidates.clone(),
                control_shape: self
                    .control_shape
                    .clone()
                    .unwrap_or_else(|| self.kind.default_shape()),
                control_scale: self
                    .control_scale
                    .unwrap_or_else(|| self.kind.default_scale()),
                control_color: self.control_color,
                aim_axis: self.aim_axis,
                enabled: self.enabled,
                use_custom_curve: self.use_custom_curve,
                custom_geometry: self.custom_geometry.clone(),
            },
            params,
        })
    }
}

impl RigDocument {
    pub fn from_rig(rig: &Rig) -> RigResult<Self> {
        Ok(Self {
            schema_version: DOCUMENT_VERSION,
            name: rig.name().to_string(),
            bake_on_bind: rig.bake_on_bind(),
            components: rig
                .graph()
                .iter()
                .map(ComponentRecord::from_component)
                .collect::<RigResult<_>>()?,
        })
    }

    /// Builds an `Empty` rig. Every component is validated as if added in
    /// document order.
    pub fn into_rig(self) -> RigResult<Rig> {
        let components = self
            .components
            .iter()
            .map(ComponentRecord::to_component)
            .collect::<RigResult<Vec<_>>>()?;
        let graph = ComponentGraph::from_components(components)?;
        Ok(Rig::new(self.name)
            .with_graph(graph)
            .with_bake_on_bind(self.bake_on_bind))
    }

    pub fn to_json(&self) -> RigResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| RigError::Document(format!("failed to serialize rig: {}", e)))
    }

    /// Parses a document, checking the schema version before the body.
    pub fn from_json(json: &str) -> RigResult<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| RigError::Document(format!("invalid JSON: {}", e)))?;
        let version = value
            .get("schema_version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| RigError::Document("missing schema_version".to_string()))?;
        if version != u64::from(DOCUMENT_VERSION) {
            return Err(RigError::Document(format!(
                "unsupported schema_version {} (expected {})",
                version, DOCUMENT_VERSION
            )));
        }
        serde_json::from_value(value).map_err(|e| RigError::Document(e.to_string()))
    }
}

/// Writes the rig to `path` and associates the rig with it.
pub fn save(rig: &mut Rig, path: &Path) -> RigResult<()> {
    let json = RigDocument::from_rig(rig)?.to_json()?;
    std::fs::write(path, json).map_err(|e| {
        RigError::Document(format!("failed to write '{}': {}", path.display(), e))
    })?;
    rig.set_path(Some(path.to_path_buf()));
    tracing::info!(rig = %rig.name(), path = %path.display(), "rig saved");
    Ok(())
}

/// Reads a rig from `path`. The returned rig is `Empty` and associated with
/// the file.
pub fn load(path: &Path) -> RigResult<Rig> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        RigError::Document(format!("failed to read '{}': {}", path.display(), e))
    })?;
    let mut rig = RigDocument::from_json(&json)?.into_rig()?;
    rig.set_path(Some(path.to_path_buf()));
    tracing::info!(rig = %rig.name(), path = %path.display(), "rig loaded");
    Ok(rig)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_minimal_record_takes_kind_defaults() {
        let json = r#"{
            "schema_version": 1,
            "name": "hero",
            "components": [
                { "name": "spine", "kind": "spine_ik",
                  "kind_params": { "chain": { "bind_targets": ["s0", "s1", "s2"] } } }
            ]
        }"#;
        let rig = RigDocument::from_json(json).unwrap().into_rig().unwrap();
        let spine = rig.graph().get("spine").unwrap();
        assert_eq!(spine.kind(), ComponentKind::SpineIk);
        assert_eq!(spine.base.control_scale, 2.0);
        assert!(spine.base.enabled);
        assert_eq!(spine.chain().unwrap().bind_targets.len(), 3);
    }

    #[test]
    fn test_rejects_other_versions_and_unknown_fields() {
        let err = RigDocument::from_json(r#"{ "schema_version": 2, "name": "hero" }"#).unwrap_err();
        assert!(matches!(err, RigError::Document(ref m) if m.contains("schema_version 2")));

        let err = RigDocument::from_json(r#"{ "name": "hero" }"#).unwrap_err();
        assert!(matches!(err, RigError::Document(_)));

        let err =
            RigDocument::from_json(r#"{ "schema_version": 1, "name": "hero", "extra": true }"#)
                .unwrap_err();
        assert!(matches!(err, RigError::Document(_)));
    }

    #[test]
    fn test_invalid_graph_in_document() {
        let json = r#"{
            "schema_version": 1,
            "name": "hero",
            "components": [
                { "name": "a", "kind": "fk", "parent_space": "missing" }
            ]
        }"#;
        let err = RigDocument::from_json(json).unwrap().into_rig().unwrap_err();
        assert!(matches!(err, RigError::Reference(_)));
    }
}
