//! Validated location fixes
//!
//! A `LocationFix` is built once from a platform reading and never changes
//! afterwards. The NONE sentinel stands for "no fix known yet" and loses
//! every comparison against a real fix.

use crate::ports::location::{RawLocation, GPS_PROVIDER, NETWORK_PROVIDER};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use thiserror::Error;

/// Errors raised while turning a platform reading into a fix
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FixError {
    /// The reading was absent or unusable
    #[error("Invalid location fix: {0}")]
    InvalidFix(String),
}

/// Positioning technology that produced a fix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Gps,
    Network,
    Unknown,
    /// Only carried by the NONE sentinel
    None,
}

impl Provider {
    /// Classify a platform provider id
    pub fn from_id(id: &str) -> Self {
        match id {
            GPS_PROVIDER => Provider::Gps,
            NETWORK_PROVIDER => Provider::Network,
            _ => Provider::Unknown,
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Gps => write!(f, "gps"),
            Provider::Network => write!(f, "network"),
            Provider::Unknown => write!(f, "unknown"),
            Provider::None => write!(f, "none"),
        }
    }
}

/// A single validated position reading
#[derive(Debug, Clone, PartialEq)]
pub struct LocationFix {
    latitude: f64,
    longitude: f64,
    accuracy: Option<f32>,
    timestamp_ms: i64,
    provider: Provider,
    source: String,
}

impl LocationFix {
    /// The "no fix available" sentinel
    pub fn none() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            accuracy: None,
            timestamp_ms: 0,
            provider: Provider::None,
            source: String::new(),
        }
    }

    /// Build a fix from a platform reading
    ///
    /// # Errors
    /// Returns `FixError::InvalidFix` if the reading is absent or its
    /// coordinates are not finite or out of range.
    pub fn from_raw(raw: Option<RawLocation>) -> Result<Self, FixError> {
        let raw = raw.ok_or_else(|| FixError::InvalidFix("no reading available".to_string()))?;

        if !raw.latitude.is_finite() || !(-90.0..=90.0).contains(&raw.latitude) {
            return Err(FixError::InvalidFix(format!(
                "latitude {} out of range",
                raw.latitude
            )));
        }
        if !raw.longitude.is_finite() || !(-180.0..=180.0).contains(&raw.longitude) {
            return Err(FixError::InvalidFix(format!(
                "longitude {} out of range",
                raw.longitude
            )));
        }

        // A negative or NaN accuracy means the provider did not really measure one
        let accuracy = raw.accuracy.filter(|a| a.is_finite() && *a >= 0.0);

        Ok(Self {
            latitude: raw.latitude,
            longitude: raw.longitude,
            accuracy,
            timestamp_ms: raw.time_ms,
            provider: Provider::from_id(&raw.provider),
            source: raw.provider,
        })
    }

    /// Whether this is the NONE sentinel
    pub fn is_none(&self) -> bool {
        self.provider == Provider::None
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Latitude in micro-degrees, truncated
    pub fn latitude_e6(&self) -> i64 {
        (self.latitude * 1e6) as i64
    }

    /// Longitude in micro-degrees, truncated
    pub fn longitude_e6(&self) -> i64 {
        (self.longitude * 1e6) as i64
    }

    /// Reported accuracy in meters
    pub fn accuracy(&self) -> Option<f32> {
        self.accuracy
    }

    /// Accuracy for comparisons; unknown accuracy is the worst accuracy
    pub fn accuracy_or_worst(&self) -> f64 {
        self.accuracy.map(f64::from).unwrap_or(f64::INFINITY)
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    /// Platform provider id the fix came from
    pub fn source(&self) -> &str {
        &self.source
    }
}

impl fmt::Display for LocationFix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            return write!(f, "<no fix>");
        }

        let time = DateTime::<Utc>::from_timestamp_millis(self.timestamp_ms)
            .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_else(|| format!("{}ms", self.timestamp_ms));

        write!(
            f,
            "[{}] {:.6},{:.6} acc={} at {}",
            self.source,
            self.latitude,
            self.longitude,
            self.accuracy
                .map(|a| format!("{:.1}m", a))
                .unwrap_or_else(|| "?".to_string()),
            time
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(provider: &str, accuracy: Option<f32>, time_ms: i64) -> RawLocation {
        RawLocation {
            provider: provider.to_string(),
            latitude: 52.5,
            longitude: 13.4,
            accuracy,
            time_ms,
        }
    }

    #[test]
    fn test_from_raw_absent_reading_is_invalid() {
        let result = LocationFix::from_raw(None);
        assert!(matches!(result, Err(FixError::InvalidFix(_))));
    }

    #[test]
    fn test_from_raw_classifies_provider() {
        let gps = LocationFix::from_raw(Some(raw("gps", Some(5.0), 1))).unwrap();
        assert_eq!(gps.provider(), Provider::Gps);

        let network = LocationFix::from_raw(Some(raw("network", Some(5.0), 1))).unwrap();
        assert_eq!(network.provider(), Provider::Network);

        let fused = LocationFix::from_raw(Some(raw("fused", Some(5.0), 1))).unwrap();
        assert_eq!(fused.provider(), Provider::Unknown);
        assert_eq!(fused.source(), "fused");
    }

    #[test]
    fn test_from_raw_rejects_out_of_range_coordinates() {
        let mut reading = raw("gps", None, 1);
        reading.latitude = 91.0;
        assert!(LocationFix::from_raw(Some(reading)).is_err());

        let mut reading = raw("gps", None, 1);
        reading.longitude = f64::NAN;
        assert!(LocationFix::from_raw(Some(reading)).is_err());
    }

    #[test]
    fn test_negative_accuracy_treated_as_unknown() {
        let fix = LocationFix::from_raw(Some(raw("gps", Some(-1.0), 1))).unwrap();
        assert!(fix.accuracy().is_none());
        assert_eq!(fix.accuracy_or_worst(), f64::INFINITY);
    }

    #[test]
    fn test_none_sentinel() {
        let none = LocationFix::none();
        assert!(none.is_none());
        assert_eq!(none.provider(), Provider::None);
        assert_eq!(none.to_string(), "<no fix>");

        let real = LocationFix::from_raw(Some(raw("gps", Some(3.0), 1))).unwrap();
        assert!(!real.is_none());
    }

    #[test]
    fn test_e6_coordinates() {
        let fix = LocationFix::from_raw(Some(raw("gps", None, 1))).unwrap();
        assert_eq!(fix.latitude_e6(), 52_500_000);
        assert_eq!(fix.longitude_e6(), 13_400_000);
    }

    #[test]
    fn test_display_includes_source_and_time() {
        let fix = LocationFix::from_raw(Some(raw("gps", Some(10.0), 0))).unwrap();
        let text = fix.to_string();
        assert!(text.contains("[gps]"));
        assert!(text.contains("acc=10.0m"));
        assert!(text.contains("1970-01-01T00:00:00.000Z"));
    }
}
