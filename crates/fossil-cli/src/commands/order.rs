//! Order command implementation
//!
//! Prints components in generation order with their space dependencies.

use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;

use super::load_rig;

/// Run the order command
pub fn run(rig_path: &str) -> Result<ExitCode> {
    let rig = load_rig(rig_path)?;
    println!("{} {}", "Generation order:".cyan().bold(), rig.name());

    for (index, component) in rig.graph().topological_order()?.into_iter().enumerate() {
        let spaces = component.space_references();
        let deps = if spaces.is_empty() {
            String::new()
        } else {
            format!(" <- {}", spaces.join(", "))
        };
        let disabled = if component.base.enabled {
            String::new()
        } else {
            " (disabled)".dimmed().to_string()
        };
        println!(
            "  {:>3}. {} {}{}{}",
            index + 1,
            component.name().bold(),
            component.kind().to_string().dimmed(),
            deps.dimmed(),
            disabled
        );
    }
    Ok(ExitCode::SUCCESS)
}
