//! CLI command implementations
//!
//! Each subcommand has its own module with the implementation logic.

pub mod compare;
pub mod config;
pub mod last;
pub mod replay;
