//! Error types for LightLoc
//!
//! Errors tied to one module live next to it and are re-exported here.

use thiserror::Error;

pub use crate::fix::FixError;
pub use crate::logging::LoggerError;
pub use crate::ports::location::PortError;
pub use crate::service::ServiceError;

use crate::ports::location::SubscriptionId;

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Parse error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Removing one subscription failed while tearing a session down
///
/// Never returned to callers; teardown logs it and moves on to the next
/// subscription.
#[derive(Debug, Error)]
#[error("Failed to remove {what} ({subscription}): {source}")]
pub struct TeardownError {
    /// Which registration was being removed
    pub what: &'static str,
    pub subscription: SubscriptionId,
    #[source]
    pub source: PortError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue("session_timeout_secs must be > 0".to_string());
        assert!(err.to_string().contains("session_timeout_secs"));
    }

    #[test]
    fn test_config_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: ConfigError = io.into();
        assert!(matches!(err, ConfigError::Io(_)));
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn test_teardown_error_display() {
        let err = TeardownError {
            what: "gps updates",
            subscription: SubscriptionId(4),
            source: PortError::Platform("binder died".to_string()),
        };
        let msg = err.to_string();
        assert!(msg.contains("gps updates"));
        assert!(msg.contains("sub#4"));
        assert!(msg.contains("binder died"));
    }

    // === Anyhow Interoperability Tests ===

    #[test]
    fn test_config_error_to_anyhow() {
        let anyhow_err: anyhow::Error = ConfigError::InvalidValue("test".to_string()).into();
        assert!(anyhow_err.to_string().contains("test"));
    }

    #[test]
    fn test_result_with_anyhow() {
        fn fallible_operation() -> anyhow::Result<()> {
            Err(FixError::InvalidFix("absent".to_string()))?
        }

        assert!(fallible_operation().is_err());
    }
}
