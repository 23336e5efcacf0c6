//! Best last-known location across every provider on the device

use crate::fix::LocationFix;
use crate::ports::location::LocationPort;
use tracing::{debug, warn};

/// Find the most useful last-known fix without subscribing to anything
///
/// Among the fixes that report an accuracy and are no older than
/// `min_time_ms`, the most accurate one wins. If none qualifies the newest
/// fix of any provider is returned instead, and `None` only when no
/// provider has a last-known fix at all.
pub async fn find_last_best_location<P>(port: &P, min_time_ms: i64) -> Option<LocationFix>
where
    P: LocationPort + ?Sized,
{
    let providers = match port.all_providers().await {
        Ok(providers) => providers,
        Err(e) => {
            warn!("Cannot list location providers: {}", e);
            return None;
        }
    };

    let mut best_accurate: Option<LocationFix> = None;
    let mut newest: Option<LocationFix> = None;

    for provider in providers {
        let raw = match port.last_known_location(&provider).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!("No last known location from {}: {}", provider, e);
                continue;
            }
        };
        let Some(raw) = raw else {
            continue;
        };
        let fix = match LocationFix::from_raw(Some(raw)) {
            Ok(fix) => fix,
            Err(e) => {
                debug!("Ignoring last known location from {}: {}", provider, e);
                continue;
            }
        };

        if let Some(accuracy) = fix.accuracy() {
            let is_fresh = fix.timestamp_ms() >= min_time_ms;
            let beats_best = best_accurate
                .as_ref()
                .map_or(true, |best| f64::from(accuracy) < best.accuracy_or_worst());
            if is_fresh && beats_best {
                best_accurate = Some(fix.clone());
            }
        }

        if newest
            .as_ref()
            .map_or(true, |n| fix.timestamp_ms() > n.timestamp_ms())
        {
            newest = Some(fix);
        }
    }

    best_accurate.or(newest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::location::{
        Criteria, PortError, RawLocation, SubscriptionId, UpdateRequest,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;

    // Read-only port that only knows last-known readings
    struct LastKnownPort {
        readings: HashMap<String, Result<Option<RawLocation>, PortError>>,
        order: Vec<String>,
    }

    impl LastKnownPort {
        fn new() -> Self {
            Self {
                readings: HashMap::new(),
                order: Vec::new(),
            }
        }

        fn with(mut self, provider: &str, reading: Result<Option<RawLocation>, PortError>) -> Self {
            self.order.push(provider.to_string());
            self.readings.insert(provider.to_string(), reading);
            self
        }
    }

    #[async_trait]
    impl LocationPort for LastKnownPort {
        async fn all_providers(&self) -> Result<Vec<String>, PortError> {
            Ok(self.order.clone())
        }

        async fn last_known_location(
            &self,
            provider: &str,
        ) -> Result<Option<RawLocation>, PortError> {
            self.readings
                .get(provider)
                .cloned()
                .unwrap_or_else(|| Err(PortError::ProviderUnavailable(provider.to_string())))
        }

        async fn best_provider(
            &self,
            _criteria: &Criteria,
            _enabled_only: bool,
        ) -> Result<Option<String>, PortError> {
            Ok(None)
        }

        async fn request_updates(
            &self,
            provider: &str,
            _request: &UpdateRequest,
        ) -> Result<SubscriptionId, PortError> {
            Err(PortError::ProviderUnavailable(provider.to_string()))
        }

        async fn remove_updates(&self, subscription: SubscriptionId) -> Result<(), PortError> {
            Err(PortError::UnknownSubscription(subscription.0))
        }

        async fn watch_provider_status(&self) -> Result<SubscriptionId, PortError> {
            Err(PortError::Platform("unsupported".to_string()))
        }
    }

    fn reading(provider: &str, accuracy: Option<f32>, time_ms: i64) -> Result<Option<RawLocation>, PortError> {
        Ok(Some(RawLocation {
            provider: provider.to_string(),
            latitude: 48.1,
            longitude: 11.5,
            accuracy,
            time_ms,
        }))
    }

    #[tokio::test]
    async fn test_most_accurate_fresh_fix_wins() {
        let port = LastKnownPort::new()
            .with("gps", reading("gps", Some(8.0), 5_000))
            .with("network", reading("network", Some(40.0), 9_000))
            .with("passive", reading("passive", Some(3.0), 500));

        let best = find_last_best_location(&port, 1_000).await.unwrap();
        assert_eq!(best.source(), "gps");
    }

    #[tokio::test]
    async fn test_falls_back_to_newest_when_nothing_fresh() {
        let port = LastKnownPort::new()
            .with("gps", reading("gps", Some(8.0), 100))
            .with("network", reading("network", None, 900));

        let best = find_last_best_location(&port, 1_000).await.unwrap();
        assert_eq!(best.source(), "network");
    }

    #[tokio::test]
    async fn test_failing_and_empty_providers_are_skipped() {
        let port = LastKnownPort::new()
            .with("gps", Err(PortError::PermissionDenied("gps".to_string())))
            .with("network", Ok(None))
            .with("fused", reading("fused", Some(12.0), 2_000));

        let best = find_last_best_location(&port, 0).await.unwrap();
        assert_eq!(best.source(), "fused");
    }

    #[tokio::test]
    async fn test_no_fix_anywhere() {
        let port = LastKnownPort::new()
            .with("gps", Ok(None))
            .with("network", Err(PortError::Platform("dead".to_string())));

        assert!(find_last_best_location(&port, 0).await.is_none());
    }
}
