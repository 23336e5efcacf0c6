//! Startup shared by every subcommand
//!
//! Loads the configuration, installs the logger for commands that run a
//! tracking session and hooks panics so they end up in the log file.

use anyhow::{Context, Result};
use lightloc_core::{
    get_default_config_path, init_logger, load_config_from_path, Config, LogLevel, LoggerConfig,
    LoggerGuard,
};
use std::any::Any;
use std::panic;
use std::path::{Path, PathBuf};
use tracing::error;

/// Everything a command needs after startup
pub struct AppContext {
    config: Config,
    config_path: PathBuf,
    /// Flushes the log file on drop
    #[allow(dead_code)]
    logger_guard: Option<LoggerGuard>,
}

impl AppContext {
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }
}

/// What `initialize` should set up
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Configuration file to use instead of `~/.lightloc/config.toml`
    pub config_path: Option<PathBuf>,
    pub init_logger: bool,
    pub log_to_stdout: bool,
    /// Replaces `[logging] level`
    pub log_level: Option<LogLevel>,
}

impl InitOptions {
    /// Commands that run a tracking session log to file
    pub fn session(verbose: bool) -> Self {
        Self {
            init_logger: true,
            log_to_stdout: verbose,
            ..Self::default()
        }
    }

    /// One-shot commands only print their result
    pub fn command() -> Self {
        Self::default()
    }

    pub fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn with_log_level(mut self, level: Option<LogLevel>) -> Self {
        self.log_level = level;
        self
    }
}

pub fn initialize(options: InitOptions) -> Result<AppContext> {
    let config_path = options
        .config_path
        .clone()
        .unwrap_or_else(get_default_config_path);
    let config = load_config_from_path(&config_path).with_context(|| {
        format!("Failed to load configuration from {}", config_path.display())
    })?;

    let (logger_guard, log_file) = if options.init_logger {
        let logger_config = LoggerConfig::from_config(&config)
            .context("Invalid logging configuration")?
            .with_level_override(options.log_level)
            .with_stdout(options.log_to_stdout);
        let log_file = logger_config.log_file_path();
        let guard = init_logger(logger_config).context("Failed to initialize logger")?;
        (Some(guard), Some(log_file))
    } else {
        (None, None)
    };

    setup_panic_hook(log_file);

    Ok(AppContext {
        config,
        config_path,
        logger_guard,
    })
}

/// Logs a panic before the default hook prints it
///
/// When a log file is active the user is pointed at it.
fn setup_panic_hook(log_file: Option<PathBuf>) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = panic_message(panic_info.payload());

        error!(%location, %message, "Fatal error");

        eprintln!();
        eprintln!("LightLoc encountered a fatal error and must exit.");
        eprintln!("Location: {}", location);
        eprintln!("Error: {}", message);
        if let Some(log_file) = &log_file {
            eprintln!("Session log: {}", log_file.display());
        }
        eprintln!();

        default_hook(panic_info);
    }));
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic payload".to_string()
    }
}
