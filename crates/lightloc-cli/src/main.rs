//! LightLoc CLI - location fix arbitration and tracking playground
//!
//! Main entry point for the `lightloc` binary.

mod app;
mod commands;

use anyhow::Result;
use app::{initialize, InitOptions};
use clap::{Parser, Subcommand};
use commands::config::ConfigAction;
use commands::replay::ReplayOptions;
use lightloc_core::LogLevel;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "lightloc", version, about = "Location fix arbitration and tracking")]
struct Cli {
    /// Configuration file (default: ~/.lightloc/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decide which of two readings should be kept
    Compare {
        /// Newly arrived reading (JSON, or `null`)
        candidate: PathBuf,
        /// Best reading known so far (JSON, or `null`)
        current: PathBuf,
    },
    /// Run a tracking session over a recorded trace
    Replay {
        /// Trace file (JSON lines)
        trace: PathBuf,

        /// Playback speed multiplier
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Play the trace without waiting between entries
        #[arg(long, conflicts_with = "speed")]
        instant: bool,

        /// Mirror log output to stdout
        #[arg(short, long)]
        verbose: bool,
    },
    /// Print the best last known location of the device a trace sets up
    Last {
        /// Trace file (JSON lines); only leading `register` entries are used
        trace: PathBuf,

        /// Oldest acceptable fix time, in epoch milliseconds
        #[arg(long)]
        min_time_ms: Option<i64>,

        /// Oldest acceptable fix age, in seconds before now
        #[arg(long, conflicts_with = "min_time_ms")]
        max_age_secs: Option<u64>,
    },
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let options = match &cli.command {
        Command::Replay { verbose, .. } => InitOptions::session(*verbose),
        _ => InitOptions::command(),
    }
    .with_config_path(cli.config.clone())
    .with_log_level(cli.log_level);
    let ctx = initialize(options)?;

    match cli.command {
        Command::Compare { candidate, current } => {
            commands::compare::run(ctx.config(), &candidate, &current)
        }
        Command::Replay {
            trace,
            speed,
            instant,
            verbose: _,
        } => {
            let speed = if instant { f64::INFINITY } else { speed };
            commands::replay::run(ctx.config(), &trace, ReplayOptions { speed }).await
        }
        Command::Last {
            trace,
            min_time_ms,
            max_age_secs,
        } => commands::last::run(&trace, min_time_ms, max_age_secs).await,
        Command::Config { action } => commands::config::run(action, ctx.config(), ctx.config_path()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_replay() {
        let cli = Cli::parse_from([
            "lightloc",
            "--log-level",
            "debug",
            "replay",
            "trace.jsonl",
            "--speed",
            "4",
        ]);
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        match cli.command {
            Command::Replay {
                trace,
                speed,
                instant,
                ..
            } => {
                assert_eq!(trace, PathBuf::from("trace.jsonl"));
                assert_eq!(speed, 4.0);
                assert!(!instant);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_config_after_subcommand() {
        let cli = Cli::parse_from(["lightloc", "config", "path", "--config", "/tmp/l.toml"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/l.toml")));
        assert!(matches!(
            cli.command,
            Command::Config {
                action: ConfigAction::Path
            }
        ));
    }

    #[test]
    fn test_invalid_log_level_is_rejected() {
        assert!(Cli::try_parse_from(["lightloc", "--log-level", "loud", "config", "show"]).is_err());
    }
}
