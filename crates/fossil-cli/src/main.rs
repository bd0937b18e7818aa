//! Fossil CLI - Command-line interface for component rigs
//!
//! This binary validates rig documents and runs the rig lifecycle
//! (preview, bind, bake) against skeleton files.

use clap::{ArgAction, Parser, Subcommand};
use std::process::ExitCode;

use fossil_cli::{commands, logging};

/// Fossil - Component-based control rigs
#[derive(Parser)]
#[command(name = "fossil")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv). RUST_LOG overrides this.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a rig document, optionally checking targets in a skeleton
    Validate {
        /// Path to the rig document
        #[arg(short, long)]
        rig: String,

        /// Skeleton file to check bind targets against
        #[arg(short, long)]
        skeleton: Option<String>,
    },

    /// Print components in generation order
    Order {
        /// Path to the rig document
        #[arg(short, long)]
        rig: String,
    },

    /// Generate controls against a skeleton and report their placement
    Preview {
        /// Path to the rig document
        #[arg(short, long)]
        rig: String,

        /// Path to the skeleton file
        #[arg(short, long)]
        skeleton: String,

        /// Output machine-readable JSON (no colored output)
        #[arg(long)]
        json: bool,
    },

    /// Preview and bind a rig to a skeleton
    Bind {
        /// Path to the rig document
        #[arg(short, long)]
        rig: String,

        /// Path to the skeleton file
        #[arg(short, long)]
        skeleton: String,

        /// Bake the skeleton's animation onto the controls before binding
        #[arg(long)]
        bake: bool,
    },

    /// Bake a skeleton's animation onto the rig's controls
    Bake {
        /// Path to the rig document
        #[arg(short, long)]
        rig: String,

        /// Path to the animated skeleton file
        #[arg(short, long)]
        skeleton: String,

        /// Write the baked control keys to this JSON file
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let result = match cli.command {
        Commands::Validate { rig, skeleton } => commands::validate::run(&rig, skeleton.as_deref()),
        Commands::Order { rig } => commands::order::run(&rig),
        Commands::Preview {
            rig,
            skeleton,
            json,
        } => commands::preview::run(&rig, &skeleton, json),
        Commands::Bind {
            rig,
            skeleton,
            bake,
        } => commands::bind::run(&rig, &skeleton, bake),
        Commands::Bake {
            rig,
            skeleton,
            output,
        } => commands::bake::run(&rig, &skeleton, output.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(1)
        }
    }
}
