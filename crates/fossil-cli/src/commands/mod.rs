//! CLI command implementations

pub mod bake;
pub mod bind;
pub mod order;
pub mod preview;
pub mod validate;

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use fossil_rig::scene::world_transform;
use fossil_rig::{document, MemoryScene, RegenerateWarning, Rig, RigSettings};

use crate::skeleton;

/// Loads a rig document and applies settings from the environment.
pub(crate) fn load_rig(path: &str) -> Result<Rig> {
    let settings = RigSettings::from_env().context("Failed to load settings")?;
    let factory = settings
        .curve_factory()
        .context("Failed to load shape library")?;
    let rig = document::load(Path::new(path))
        .with_context(|| format!("Failed to load rig document: {}", path))?;
    Ok(rig.with_settings(settings).with_factory(factory))
}

pub(crate) fn load_skeleton(path: &str) -> Result<MemoryScene> {
    skeleton::load_scene(Path::new(path))
        .with_context(|| format!("Failed to load skeleton: {}", path))
}

pub(crate) fn print_warnings(warnings: &[RegenerateWarning]) {
    for warning in warnings {
        println!(
            "  {} {} [{}]: {}",
            "!".yellow(),
            warning.code.to_string().yellow(),
            warning.component,
            warning.message
        );
    }
}

/// World placement of one generated control.
#[derive(Debug, Clone, Serialize)]
pub struct ControlSummary {
    pub role: String,
    pub translation: [f64; 3],
    /// Quaternion `[x, y, z, w]`.
    pub rotation: [f64; 4],
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentSummary {
    pub name: String,
    pub kind: String,
    pub spaces: Vec<String>,
    pub controls: Vec<ControlSummary>,
}

/// Generated controls of every component, in generation order.
pub(crate) fn summarize(rig: &Rig, scene: &MemoryScene) -> Result<Vec<ComponentSummary>> {
    let mut summaries = Vec::new();
    for component in rig.graph().topological_order()? {
        let Some(generated) = rig.generated(component.name()) else {
            continue;
        };
        let mut controls = Vec::new();
        for control in &generated.controls {
            let world = world_transform(scene, control.control)?;
            controls.push(ControlSummary {
                role: control.role.to_string(),
                translation: world.translation.to_array(),
                rotation: world.rotation.to_array(),
            });
        }
        summaries.push(ComponentSummary {
            name: component.name().to_string(),
            kind: component.kind().to_string(),
            spaces: generated.spaces.parent.labels(),
            controls,
        });
    }
    Ok(summaries)
}
