//! Validate command implementation
//!
//! Loads a rig document and, given a skeleton, checks every component's
//! targets the way bind would.

use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;

use super::{load_rig, load_skeleton};

/// Run the validate command
///
/// # Returns
/// Exit code: 0 if the document loads and every target check passes, 1
/// otherwise
pub fn run(rig_path: &str, skeleton_path: Option<&str>) -> Result<ExitCode> {
    println!("{} {}", "Validating:".cyan().bold(), rig_path);

    let rig = match load_rig(rig_path) {
        Ok(rig) => rig,
        Err(e) => {
            println!("  {} {:#}", "x".red(), e);
            println!("\n{}", "Rig document is invalid".red().bold());
            return Ok(ExitCode::from(1));
        }
    };
    println!(
        "{} {} ({} components)",
        "Rig:".dimmed(),
        rig.name(),
        rig.graph().len()
    );

    if let Some(path) = skeleton_path {
        let scene = load_skeleton(path)?;
        let problems = rig.readiness(&scene);
        for problem in &problems {
            println!("  {} {}", "x".red(), problem);
        }
        if !problems.is_empty() {
            println!(
                "\n{} {} component(s) cannot bind",
                "Not ready:".red().bold(),
                problems.len()
            );
            return Ok(ExitCode::from(1));
        }
    }

    println!("\n{}", "Rig document is valid".green().bold());
    Ok(ExitCode::SUCCESS)
}
