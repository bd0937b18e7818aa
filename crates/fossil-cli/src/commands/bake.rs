//! Bake command implementation
//!
//! Bakes a skeleton's animation onto a rig's controls and optionally writes
//! the resulting control keys to a JSON file.

use std::collections::BTreeMap;
use std::fs;
use std::ops::ControlFlow;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use fossil_rig::{BakeProgress, BakeReport, Frame, MemoryScene, Rig, Scene};

use super::{load_rig, load_skeleton, print_warnings};

/// One baked control key in local space.
#[derive(Debug, Clone, Serialize)]
struct KeyOutput {
    frame: Frame,
    translation: [f64; 3],
    rotation: [f64; 4],
    scale: [f64; 3],
}

#[derive(Debug, Serialize)]
struct BakeOutput {
    rig: String,
    frames: usize,
    first: Option<Frame>,
    last: Option<Frame>,
    keys: usize,
    /// Component name to control role to keys.
    controls: BTreeMap<String, BTreeMap<String, Vec<KeyOutput>>>,
}

fn collect_keys(
    rig: &Rig,
    scene: &MemoryScene,
) -> Result<BTreeMap<String, BTreeMap<String, Vec<KeyOutput>>>> {
    let mut controls = BTreeMap::new();
    for (name, generated) in rig.generated_components() {
        let mut roles = BTreeMap::new();
        for control in &generated.controls {
            let keys = scene
                .transform_keys(control.control)?
                .into_iter()
                .map(|(frame, transform)| KeyOutput {
                    frame,
                    translation: transform.translation.to_array(),
                    rotation: transform.rotation.to_array(),
                    scale: transform.scale.to_array(),
                })
                .collect();
            roles.insert(control.role.to_string(), keys);
        }
        controls.insert(name.clone(), roles);
    }
    Ok(controls)
}

/// Run the bake command
///
/// # Arguments
/// * `rig_path` - Path to the rig document
/// * `skeleton_path` - Path to the animated skeleton file
/// * `output` - Optional path for the baked control keys
pub fn run(rig_path: &str, skeleton_path: &str, output: Option<&str>) -> Result<ExitCode> {
    let mut rig = load_rig(rig_path)?;
    let mut scene = load_skeleton(skeleton_path)?;

    let warnings = rig
        .preview(&mut scene)
        .with_context(|| format!("Failed to preview rig '{}'", rig.name()))?;
    print_warnings(&warnings);

    let mut observer = |progress: BakeProgress| -> ControlFlow<()> {
        tracing::debug!(
            frame = progress.frame,
            index = progress.index,
            total = progress.total,
            "baked frame"
        );
        ControlFlow::Continue(())
    };
    let report: BakeReport = rig
        .bake_with(&mut scene, &mut observer)
        .with_context(|| format!("Failed to bake rig '{}'", rig.name()))?;

    match (report.first, report.last) {
        (Some(first), Some(last)) => println!(
            "{} {} frames {}..{} ({} keys)",
            "Baked:".green().bold(),
            report.frames,
            first,
            last,
            report.keys
        ),
        _ => println!(
            "{} {} has no keyed targets",
            "Nothing to bake:".yellow().bold(),
            rig.name()
        ),
    }

    if let Some(path) = output {
        let document = BakeOutput {
            rig: rig.name().to_string(),
            frames: report.frames,
            first: report.first,
            last: report.last,
            keys: report.keys,
            controls: collect_keys(&rig, &scene)?,
        };
        let json = serde_json::to_string_pretty(&document)?;
        fs::write(path, json).with_context(|| format!("Failed to write bake output: {}", path))?;
        println!("{} {}", "Wrote:".cyan().bold(), path);
    }

    Ok(ExitCode::SUCCESS)
}
