//! Platform location service port definition

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Platform id of the satellite provider
pub const GPS_PROVIDER: &str = "gps";

/// Platform id of the cell/wifi provider
pub const NETWORK_PROVIDER: &str = "network";

/// A raw reading as delivered by the platform, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLocation {
    /// Platform provider id that produced the reading
    pub provider: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Horizontal accuracy in meters, if the provider reported one
    #[serde(default)]
    pub accuracy: Option<f32>,
    /// Epoch milliseconds of the reading
    pub time_ms: i64,
}

/// Notifications pushed by the platform to the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum PlatformEvent {
    /// A subscribed provider delivered a reading
    LocationChanged(RawLocation),
    /// A provider became available
    ProviderEnabled(String),
    /// A provider was switched off
    ProviderDisabled(String),
}

/// Accuracy class requested when asking for the best provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CriteriaAccuracy {
    /// Prefer the most precise provider
    #[default]
    Fine,
    /// Any provider is acceptable
    Coarse,
}

/// Selection criteria for `LocationPort::best_provider`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Criteria {
    pub accuracy: CriteriaAccuracy,
}

impl Criteria {
    /// Criteria asking for the most precise provider
    pub fn fine() -> Self {
        Self {
            accuracy: CriteriaAccuracy::Fine,
        }
    }
}

/// Rate limits passed along with an update subscription
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateRequest {
    /// Minimum time between two updates in milliseconds
    pub min_interval_ms: u64,
    /// Minimum movement between two updates in meters
    pub min_distance_meters: f32,
}

impl UpdateRequest {
    /// Request every update the provider produces
    pub fn unthrottled() -> Self {
        Self {
            min_interval_ms: 0,
            min_distance_meters: 0.0,
        }
    }
}

impl Default for UpdateRequest {
    fn default() -> Self {
        Self {
            min_interval_ms: 3000,
            min_distance_meters: 0.0,
        }
    }
}

/// Opaque registration token handed out by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Errors that can occur when talking to the platform location service
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PortError {
    /// The requested provider does not exist on this device
    #[error("Location provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// The application lacks location permission
    #[error("Location permission denied for provider {0}")]
    PermissionDenied(String),

    /// The subscription id is not (or no longer) registered
    #[error("Unknown subscription id: {0}")]
    UnknownSubscription(u64),

    /// Any other platform failure
    #[error("Platform location service error: {0}")]
    Platform(String),
}

/// Port for the platform's location provider service
#[async_trait]
pub trait LocationPort: Send + Sync {
    /// List the ids of every provider known to the device, enabled or not
    async fn all_providers(&self) -> Result<Vec<String>, PortError>;

    /// Last reading the provider delivered, if any
    async fn last_known_location(&self, provider: &str)
        -> Result<Option<RawLocation>, PortError>;

    /// Best provider for the criteria
    ///
    /// With `enabled_only` the answer is restricted to providers that are
    /// currently available; without it the platform may name a provider
    /// that is switched off.
    async fn best_provider(
        &self,
        criteria: &Criteria,
        enabled_only: bool,
    ) -> Result<Option<String>, PortError>;

    /// Subscribe to readings from a provider
    async fn request_updates(
        &self,
        provider: &str,
        request: &UpdateRequest,
    ) -> Result<SubscriptionId, PortError>;

    /// Cancel a subscription or status watcher
    async fn remove_updates(&self, subscription: SubscriptionId) -> Result<(), PortError>;

    /// Register for provider enabled/disabled notifications
    async fn watch_provider_status(&self) -> Result<SubscriptionId, PortError>;
}
