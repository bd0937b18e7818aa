//! Bind command implementation
//!
//! Previews a rig and attaches its controls to the skeleton, optionally
//! baking the skeleton's animation onto the controls first.

use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;

use fossil_rig::RigError;

use super::{load_rig, load_skeleton, print_warnings};

/// Run the bind command
///
/// # Arguments
/// * `rig_path` - Path to the rig document
/// * `skeleton_path` - Path to the skeleton file
/// * `bake` - Bake before binding, overriding the document's flag
///
/// # Returns
/// Exit code: 0 if bound, 1 if the skeleton does not fit the rig
pub fn run(rig_path: &str, skeleton_path: &str, bake: bool) -> Result<ExitCode> {
    let mut rig = load_rig(rig_path)?;
    if bake {
        rig.set_bake_on_bind(true);
    }
    let mut scene = load_skeleton(skeleton_path)?;

    let warnings = rig
        .preview(&mut scene)
        .with_context(|| format!("Failed to preview rig '{}'", rig.name()))?;
    print_warnings(&warnings);

    match rig.bind(&mut scene) {
        Ok(()) => {
            println!(
                "{} {} ({} constraints{})",
                "Bound:".green().bold(),
                rig.name(),
                scene.constraint_count(),
                if rig.bake_on_bind() { ", baked" } else { "" }
            );
            Ok(ExitCode::SUCCESS)
        }
        Err(e @ (RigError::Bind(_) | RigError::Bake(_))) => {
            println!("  {} {}", "x".red(), e);
            println!("\n{} rig left {}", "Bind failed:".red().bold(), rig.state());
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e).with_context(|| format!("Failed to bind rig '{}'", rig.name())),
    }
}
