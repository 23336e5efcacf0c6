//! LightLoc Core - location fix arbitration and tracking coordination
//!
//! This crate holds the domain logic: the fix comparator, the tracking
//! coordinator state machine and the async service around it. Platform
//! access goes through the `LocationPort` trait following the Hexagonal
//! Architecture pattern; concrete providers live in `lightloc-adapters`.

pub mod comparator;
pub mod config;
pub mod error;
pub mod fix;
pub mod last_location;
pub mod listeners;
pub mod logging;
pub mod ports;
pub mod service;
pub mod tracker;

// Re-export primary types for convenient access
pub use comparator::{
    select_better, select_better_with_defaults, ComparatorThresholds,
    DEFAULT_SIGNIFICANT_ACCURACY_METERS, DEFAULT_SIGNIFICANT_TIME_MS,
};
pub use config::{
    get_default_config_path, load_config, load_config_from_path, ComparatorConfig, Config,
    LoggingConfig, TrackingConfig, MAX_SESSION_TIMEOUT_SECS, MAX_SIGNIFICANT_TIME_SECS,
};
pub use error::{ConfigError, FixError, PortError, ServiceError, TeardownError};
pub use fix::{LocationFix, Provider};
pub use last_location::find_last_best_location;
pub use listeners::{FnListener, ListenerHandle, ListenerRegistry, TrackingListener};
pub use logging::{init_logger, LogLevel, LoggerConfig, LoggerError, LoggerGuard, LOG_FILE_NAME};
pub use ports::{
    Criteria, CriteriaAccuracy, LocationPort, PlatformEvent, RawLocation, SubscriptionId,
    UpdateRequest, GPS_PROVIDER, NETWORK_PROVIDER,
};
pub use service::{TrackingHandle, TrackingService, TrackingStatus};
pub use tracker::{LocationTracker, StopReason, TrackerNotice, TrackerSettings, TrackingState};
