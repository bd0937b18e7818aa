//! Skeleton files: joint hierarchies with optional animation, loaded into
//! the in-memory host.
//!
//! ```json
//! {
//!   "joints": [
//!     { "name": "hip", "translation": [0, 1, 0] },
//!     { "name": "knee", "parent": "hip", "translation": [0, -0.5, 0],
//!       "keys": [ { "frame": 1, "rotation": [0, 0, 0, 1] } ] }
//!   ]
//! }
//! ```
//!
//! Rotations are quaternions `[x, y, z, w]`. Parents must be listed before
//! their children.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fossil_rig::{Frame, MemoryScene, NodeId, NodeKind, Scene, SceneError, Transform};

#[derive(Debug, Error)]
pub enum SkeletonError {
    #[error("failed to read skeleton '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse skeleton: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("joint '{0}' is listed twice")]
    DuplicateJoint(String),
    #[error("joint '{joint}' names parent '{parent}', which is not listed before it")]
    UnknownParent { joint: String, parent: String },
    #[error("joint '{joint}' has a zero-length rotation")]
    InvalidRotation { joint: String },
    #[error(transparent)]
    Scene(#[from] SceneError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SkeletonFile {
    pub joints: Vec<JointRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JointRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default)]
    pub translation: [f64; 3],
    #[serde(default = "identity_rotation")]
    pub rotation: [f64; 4],
    #[serde(default = "unit_scale")]
    pub scale: [f64; 3],
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<KeyRecord>,
}

/// One transform key. Omitted channels take the joint's rest value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyRecord {
    pub frame: Frame,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f64; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<[f64; 3]>,
}

fn identity_rotation() -> [f64; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

fn unit_scale() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

fn rotation(joint: &str, xyzw: [f64; 4]) -> Result<DQuat, SkeletonError> {
    let quat = DQuat::from_array(xyzw);
    if quat.length_squared() < 1e-12 {
        return Err(SkeletonError::InvalidRotation {
            joint: joint.to_string(),
        });
    }
    Ok(quat.normalize())
}

impl JointRecord {
    fn rest(&self) -> Result<Transform, SkeletonError> {
        Ok(Transform::new(
            DVec3::from_array(self.translation),
            rotation(&self.name, self.rotation)?,
            DVec3::from_array(self.scale),
        ))
    }
}

impl SkeletonFile {
    pub fn from_json(json: &str) -> Result<Self, SkeletonError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, SkeletonError> {
        let json = std::fs::read_to_string(path).map_err(|source| SkeletonError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Creates every joint in a new scene.
    pub fn build(&self) -> Result<MemoryScene, SkeletonError> {
        let mut scene = MemoryScene::new();
        let mut created: BTreeMap<&str, NodeId> = BTreeMap::new();
        for joint in &self.joints {
            if created.contains_key(joint.name.as_str()) {
                return Err(SkeletonError::DuplicateJoint(joint.name.clone()));
            }
            let parent = match &joint.parent {
                Some(parent) => Some(*created.get(parent.as_str()).ok_or_else(|| {
                    SkeletonError::UnknownParent {
                        joint: joint.name.clone(),
                        parent: parent.clone(),
                    }
                })?),
                None => None,
            };
            let node = scene.create_node(&joint.name, NodeKind::Joint, parent)?;
            let rest = joint.rest()?;
            scene.set_local_transform(node, rest)?;
            for key in &joint.keys {
                let transform = Transform::new(
                    key.translation.map(DVec3::from_array).unwrap_or(rest.translation),
                    match key.rotation {
                        Some(xyzw) => rotation(&joint.name, xyzw)?,
                        None => rest.rotation,
                    },
                    key.scale.map(DVec3::from_array).unwrap_or(rest.scale),
                );
                scene.set_transform_key(node, key.frame, transform)?;
            }
            created.insert(joint.name.as_str(), node);
        }
        tracing::debug!(joints = self.joints.len(), "skeleton built");
        Ok(scene)
    }
}

/// Reads a skeleton file into a new in-memory scene.
pub fn load_scene(path: &Path) -> Result<MemoryScene, SkeletonError> {
    SkeletonFile::load(path)?.build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fossil_rig::scene::world_transform;
    use pretty_assertions::assert_eq;

    const ARM: &str = r#"{
        "joints": [
            { "name": "shoulder", "translation": [1, 0, 0] },
            { "name": "elbow", "parent": "shoulder", "translation": [2, 0, 0],
              "keys": [
                { "frame": 1 },
                { "frame": 5, "translation": [3, 0, 0] }
              ] }
        ]
    }"#;

    #[test]
    fn test_build_hierarchy_and_keys() {
        let mut scene = SkeletonFile::from_json(ARM).unwrap().build().unwrap();
        let elbow = scene.find("elbow").unwrap();
        assert_eq!(scene.parent(elbow).unwrap(), scene.find("shoulder"));
        assert_eq!(scene.transform_keys(elbow).unwrap().len(), 2);

        scene.set_current_frame(5);
        let world = world_transform(&scene, elbow).unwrap();
        assert!((world.translation - DVec3::new(4.0, 0.0, 0.0)).length() < 1e-9);
    }

    #[test]
    fn test_parent_must_come_first() {
        let json = r#"{ "joints": [
            { "name": "elbow", "parent": "shoulder" },
            { "name": "shoulder" }
        ] }"#;
        let err = SkeletonFile::from_json(json).unwrap().build().unwrap_err();
        assert!(matches!(err, SkeletonError::UnknownParent { .. }));
    }

    #[test]
    fn test_rejects_duplicates_and_zero_rotation() {
        let json = r#"{ "joints": [ { "name": "a" }, { "name": "a" } ] }"#;
        let err = SkeletonFile::from_json(json).unwrap().build().unwrap_err();
        assert!(matches!(err, SkeletonError::DuplicateJoint(ref name) if name == "a"));

        let json = r#"{ "joints": [ { "name": "a", "rotation": [0, 0, 0, 0] } ] }"#;
        let err = SkeletonFile::from_json(json).unwrap().build().unwrap_err();
        assert!(matches!(err, SkeletonError::InvalidRotation { .. }));
    }
}
