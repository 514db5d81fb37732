//! CLI argument definitions for uabe
//!
//! This module contains all clap-derived structs and enums for CLI parsing.

mod args;
mod core;

pub use args::{BundleArgs, OutputArgs};
pub use core::{Cli, Commands};
