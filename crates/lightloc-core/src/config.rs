//! Configuration management for LightLoc
//!
//! Handles loading and validation of TOML configuration files.

use crate::comparator::ComparatorThresholds;
use crate::error::ConfigError;
use crate::logging::LogLevel;
use crate::ports::location::UpdateRequest;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted `tracking.session_timeout_secs` (one week)
pub const MAX_SESSION_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Longest accepted `comparator.significant_time_secs` (one year)
pub const MAX_SIGNIFICANT_TIME_SECS: u64 = 365 * 24 * 60 * 60;

/// Main configuration structure for LightLoc
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Fix comparison thresholds
    #[serde(default)]
    pub comparator: ComparatorConfig,

    /// Tracking session settings
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Comparator configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ComparatorConfig {
    /// Time difference that decides on its own, in seconds (default: 900)
    #[serde(default = "default_significant_time_secs")]
    pub significant_time_secs: u64,

    /// Accuracy loss tolerated from a newer same-provider fix (default: 200.0)
    #[serde(default = "default_significant_accuracy_meters")]
    pub significant_accuracy_meters: f64,
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            significant_time_secs: default_significant_time_secs(),
            significant_accuracy_meters: default_significant_accuracy_meters(),
        }
    }
}

/// Tracking session configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingConfig {
    /// Seconds after which a session stops on its own (default: 60)
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    /// Minimum time between provider updates in milliseconds (default: 3000)
    #[serde(default = "default_min_update_interval_ms")]
    pub min_update_interval_ms: u64,

    /// Minimum distance between provider updates in meters (default: 0.0)
    #[serde(default = "default_min_update_distance_meters")]
    pub min_update_distance_meters: f32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: default_session_timeout_secs(),
            min_update_interval_ms: default_min_update_interval_ms(),
            min_update_distance_meters: default_min_update_distance_meters(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug or trace (default: info)
    #[serde(default = "default_level")]
    pub level: String,

    /// Directory for log files (default: ~/.lightloc/logs)
    #[serde(default = "default_log_dir", deserialize_with = "deserialize_dir")]
    pub log_dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_dir: default_log_dir(),
        }
    }
}

// Default value functions
fn default_significant_time_secs() -> u64 {
    15 * 60
}

fn default_significant_accuracy_meters() -> f64 {
    200.0
}

fn default_session_timeout_secs() -> u64 {
    60
}

fn default_min_update_interval_ms() -> u64 {
    3000
}

fn default_min_update_distance_meters() -> f32 {
    0.0
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    base_dir().join("logs")
}

fn base_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lightloc")
}

/// Expands a leading tilde (~) to the home directory
fn expand_tilde(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if let Some(rest) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path_str == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    path.to_path_buf()
}

fn deserialize_dir<'de, D>(deserializer: D) -> Result<PathBuf, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let path_str = String::deserialize(deserializer)?;
    Ok(expand_tilde(&PathBuf::from(path_str)))
}

impl Config {
    /// Validates the configuration values
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` if:
    /// - `tracking.session_timeout_secs` is 0 or above `MAX_SESSION_TIMEOUT_SECS`
    /// - `comparator.significant_time_secs` is 0 or above `MAX_SIGNIFICANT_TIME_SECS`
    /// - a distance or accuracy threshold is negative or not finite
    /// - `logging.level` is not a known level
    pub fn validate(&self) -> Result<(), ConfigError> {
        let timeout = self.tracking.session_timeout_secs;
        if timeout == 0 || timeout > MAX_SESSION_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue(format!(
                "session_timeout_secs must be between 1 and {}, got {}",
                MAX_SESSION_TIMEOUT_SECS, timeout
            )));
        }

        let window = self.comparator.significant_time_secs;
        if window == 0 || window > MAX_SIGNIFICANT_TIME_SECS {
            return Err(ConfigError::InvalidValue(format!(
                "significant_time_secs must be between 1 and {}, got {}",
                MAX_SIGNIFICANT_TIME_SECS, window
            )));
        }

        let accuracy = self.comparator.significant_accuracy_meters;
        if !accuracy.is_finite() || accuracy < 0.0 {
            return Err(ConfigError::InvalidValue(
                "significant_accuracy_meters must be a finite value >= 0".to_string(),
            ));
        }

        let distance = self.tracking.min_update_distance_meters;
        if !distance.is_finite() || distance < 0.0 {
            return Err(ConfigError::InvalidValue(
                "min_update_distance_meters must be a finite value >= 0".to_string(),
            ));
        }

        self.log_level()?;

        Ok(())
    }

    /// Comparator thresholds derived from the `[comparator]` section
    ///
    /// An unvalidated window too large for `i64` milliseconds saturates.
    pub fn comparator(&self) -> ComparatorThresholds {
        ComparatorThresholds {
            significant_time_ms: i64::try_from(self.comparator.significant_time_secs)
                .unwrap_or(i64::MAX)
                .saturating_mul(1000),
            significant_accuracy_meters: self.comparator.significant_accuracy_meters,
        }
    }

    /// Update request sent with every provider subscription
    pub fn update_request(&self) -> UpdateRequest {
        UpdateRequest {
            min_interval_ms: self.tracking.min_update_interval_ms,
            min_distance_meters: self.tracking.min_update_distance_meters,
        }
    }

    /// How long a tracking session may run before it stops on its own
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.tracking.session_timeout_secs)
    }

    /// Parsed `[logging] level`
    pub fn log_level(&self) -> Result<LogLevel, ConfigError> {
        self.logging
            .level
            .parse::<LogLevel>()
            .map_err(ConfigError::InvalidValue)
    }
}

/// Returns the default configuration file path (`~/.lightloc/config.toml`)
pub fn get_default_config_path() -> PathBuf {
    base_dir().join("config.toml")
}

/// Loads configuration from the specified path
///
/// If the file doesn't exist, creates a default configuration file.
/// If the file is invalid or contains invalid values, returns default configuration.
///
/// # Returns
/// * `Ok(Config)` - Successfully loaded or default configuration
/// * `Err(ConfigError)` - Only for IO errors
pub fn load_config_from_path(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let default_config = Config::default();
        let toml_str = toml::to_string_pretty(&default_config)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        fs::write(path, &toml_str)?;

        tracing::info!("Created default configuration file at {:?}", path);
        return Ok(default_config);
    }

    let content = fs::read_to_string(path)?;

    let config: Config = match toml::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(
                "Failed to parse configuration file {:?}: {}. Using default configuration.",
                path,
                e
            );
            return Ok(Config::default());
        }
    };

    if let Err(e) = config.validate() {
        tracing::warn!(
            "Invalid configuration in {:?}: {}. Using default configuration.",
            path,
            e
        );
        return Ok(Config::default());
    }

    Ok(config)
}

/// Loads configuration from the default path (`~/.lightloc/config.toml`)
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from_path(&get_default_config_path())
}
