//! Command handlers for uabe CLI
//!
//! Each subcommand has its own module with handler functions.

pub mod bundle;
pub mod configure;
pub mod object;
pub mod text;
pub mod texture;
