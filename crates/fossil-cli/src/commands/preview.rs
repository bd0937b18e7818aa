//! Preview command implementation
//!
//! Generates a rig's controls against a skeleton and reports where they
//! landed.

use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;

use super::{load_rig, load_skeleton, print_warnings, summarize, ComponentSummary};

#[derive(Debug, Serialize)]
struct PreviewOutput {
    rig: String,
    warnings: Vec<String>,
    components: Vec<ComponentSummary>,
}

/// Run the preview command
///
/// # Arguments
/// * `rig_path` - Path to the rig document
/// * `skeleton_path` - Path to the skeleton file
/// * `json_output` - Print a JSON summary instead of colored text
pub fn run(rig_path: &str, skeleton_path: &str, json_output: bool) -> Result<ExitCode> {
    let mut rig = load_rig(rig_path)?;
    let mut scene = load_skeleton(skeleton_path)?;
    let warnings = rig
        .preview(&mut scene)
        .with_context(|| format!("Failed to preview rig '{}'", rig.name()))?;
    let components = summarize(&rig, &scene)?;

    if json_output {
        let output = PreviewOutput {
            rig: rig.name().to_string(),
            warnings: warnings.iter().map(ToString::to_string).collect(),
            components,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("{} {}", "Previewed:".cyan().bold(), rig.name());
    print_warnings(&warnings);
    for component in &components {
        println!(
            "  {} {} [{}]",
            component.name.bold(),
            component.kind.dimmed(),
            component.spaces.join(" | ")
        );
        for control in &component.controls {
            let [x, y, z] = control.translation;
            println!("      {:<10} ({:.3}, {:.3}, {:.3})", control.role, x, y, z);
        }
    }
    Ok(ExitCode::SUCCESS)
}
