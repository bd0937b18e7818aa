//! Fossil CLI library.
//!
//! This crate provides the commands behind the `fossil` binary: validating
//! rig documents, printing generation order, and previewing, binding and
//! baking rigs against skeleton files in the in-memory host.

pub mod commands;
pub mod logging;
pub mod skeleton;
