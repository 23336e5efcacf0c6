//! Logging setup for LightLoc
//!
//! The `[logging]` section picks the level and the directory of the daily
//! rolling log file. A command line override may replace the level, and
//! interactive sessions can mirror log lines to stdout.
//!
//! Each workspace crate logs under its own target, so the default filter
//! names all of them. `RUST_LOG` replaces that filter when set.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::Config;
use crate::error::ConfigError;

/// Name of the log file inside the configured log directory
pub const LOG_FILE_NAME: &str = "lightloc.log";

/// Targets enabled by the default filter
pub const LOG_TARGETS: [&str; 3] = ["lightloc_core", "lightloc_adapters", "lightloc_cli"];

/// Errors that can occur while installing the logger
#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("Failed to create log directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install the log subscriber: {0}")]
    Install(String),
}

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

/// Default filter directives for `level`, one per workspace crate
pub fn filter_directives(level: LogLevel) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{}={}", target, level))
        .collect::<Vec<_>>()
        .join(",")
}

/// Where and how much to log
#[derive(Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    pub log_dir: PathBuf,
    pub level: LogLevel,
    pub log_to_stdout: bool,
}

impl LoggerConfig {
    /// Settings taken from the `[logging]` section
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self {
            log_dir: config.logging.log_dir.clone(),
            level: config.log_level()?,
            log_to_stdout: false,
        })
    }

    /// Replaces the configured level when `level` is set
    pub fn with_level_override(mut self, level: Option<LogLevel>) -> Self {
        if let Some(level) = level {
            self.level = level;
        }
        self
    }

    pub fn with_stdout(mut self, enabled: bool) -> Self {
        self.log_to_stdout = enabled;
        self
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Path of the active log file
    pub fn log_file_path(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE_NAME)
    }
}

/// Keeps the non-blocking file writer alive; dropping it flushes
pub struct LoggerGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Installs the global subscriber
///
/// Fails if a subscriber is already installed. The returned guard must
/// outlive every log call that should reach the file.
pub fn init_logger(config: LoggerConfig) -> Result<LoggerGuard, LoggerError> {
    use std::fs;
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    fs::create_dir_all(&config.log_dir).map_err(|source| LoggerError::CreateDir {
        path: config.log_dir.clone(),
        source,
    })?;

    let file_appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(config.level)));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true);

    let stdout_layer = config.log_to_stdout.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| LoggerError::Install(e.to_string()))?;

    tracing::info!(
        log_file = %config.log_file_path().display(),
        level = %config.level,
        stdout = config.log_to_stdout,
        "Logger initialized"
    );

    Ok(LoggerGuard { _guard: guard })
}

/// Routes log output of the calling test to the test harness
///
/// Only the first call in a test binary installs a subscriber.
#[cfg(test)]
pub(crate) fn init_test_logger(level: LogLevel) {
    use tracing_subscriber::{fmt, EnvFilter};

    let _ = fmt()
        .with_env_filter(EnvFilter::new(filter_directives(level)))
        .with_test_writer()
        .try_init();
}
