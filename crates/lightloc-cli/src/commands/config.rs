//! Config command
//!
//! Handles `lightloc config show|path`.

use anyhow::{Context, Result};
use clap::Subcommand;
use lightloc_core::Config;
use std::path::Path;

/// Config subcommand actions
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

/// Renders the effective configuration
pub fn render(config: &Config) -> Result<String> {
    toml::to_string_pretty(config).context("Failed to serialize configuration")
}

/// Run config subcommand
pub fn run(action: ConfigAction, config: &Config, config_path: &Path) -> Result<()> {
    match action {
        ConfigAction::Show => {
            println!("# {}", config_path.display());
            print!("{}", render(config)?);
        }
        ConfigAction::Path => println!("{}", config_path.display()),
    }
    Ok(())
}
