//! In-memory platform location service
//!
//! Behaves like a device location manager closely enough to drive the
//! tracking coordinator: providers can be registered, switched on and off
//! and fed readings, and every platform callback is delivered as a
//! `PlatformEvent` on the channel returned by `new`.

use async_trait::async_trait;
use lightloc_core::ports::location::{
    Criteria, CriteriaAccuracy, LocationPort, PlatformEvent, PortError, RawLocation,
    SubscriptionId, UpdateRequest,
};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Errors raised when driving the simulation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SimulationError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

/// Port operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    AllProviders,
    LastKnownLocation,
    BestProvider,
    RequestUpdates,
    RemoveUpdates,
    WatchProviderStatus,
}

/// Rank at or below which a provider satisfies `CriteriaAccuracy::Fine`
pub const FINE_RANK_LIMIT: u32 = 10;

#[derive(Debug, Clone)]
struct ProviderEntry {
    name: String,
    /// Lower is finer
    rank: u32,
    enabled: bool,
    last_known: Option<RawLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Registration {
    Updates(String),
    StatusWatch,
}

#[derive(Debug, Default)]
struct State {
    providers: Vec<ProviderEntry>,
    registrations: BTreeMap<SubscriptionId, Registration>,
    next_id: u64,
    failing: HashSet<Operation>,
    requested: usize,
    removed: usize,
}

impl State {
    fn provider_mut(&mut self, name: &str) -> Option<&mut ProviderEntry> {
        self.providers.iter_mut().find(|p| p.name == name)
    }

    fn check(&self, operation: Operation) -> Result<(), PortError> {
        if self.failing.contains(&operation) {
            return Err(PortError::Platform(format!("{:?} failed", operation)));
        }
        Ok(())
    }

    fn is_subscribed(&self, provider: &str) -> bool {
        self.registrations
            .values()
            .any(|r| matches!(r, Registration::Updates(p) if p == provider))
    }

    fn is_watching_status(&self) -> bool {
        self.registrations
            .values()
            .any(|r| *r == Registration::StatusWatch)
    }

    fn allocate(&mut self, registration: Registration) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.registrations.insert(id, registration);
        id
    }
}

/// Simulated location manager implementing `LocationPort`
pub struct SimulatedLocationService {
    state: Mutex<State>,
    events: mpsc::UnboundedSender<PlatformEvent>,
}

impl SimulatedLocationService {
    /// Creates an empty service and the receiving end of its event channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PlatformEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let service = Self {
            state: Mutex::new(State::default()),
            events,
        };
        (service, rx)
    }

    /// A service with a fine `gps` and a coarse `network` provider, both on
    pub fn with_default_providers() -> (Self, mpsc::UnboundedReceiver<PlatformEvent>) {
        let (service, rx) = Self::new();
        service.register_provider("gps", 1, true, None);
        service.register_provider("network", 20, true, None);
        (service, rx)
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: PlatformEvent) {
        trace!(?event, "Emitting platform event");
        if self.events.send(event).is_err() {
            debug!("Nobody is listening for platform events");
        }
    }

    /// Adds a provider, or replaces the settings of an existing one
    pub fn register_provider(
        &self,
        name: &str,
        rank: u32,
        enabled: bool,
        last_known: Option<RawLocation>,
    ) {
        let mut state = self.state();
        let entry = ProviderEntry {
            name: name.to_string(),
            rank,
            enabled,
            last_known,
        };
        match state.provider_mut(name) {
            Some(existing) => *existing = entry,
            None => state.providers.push(entry),
        }
        debug!(provider = name, rank, enabled, "Provider registered");
    }

    /// Switches a provider on or off and notifies whoever is watching
    ///
    /// Enable notices reach subscribers of that provider; disable notices
    /// reach provider status watchers. Nothing is emitted if the flag does
    /// not change.
    pub fn set_enabled(&self, name: &str, enabled: bool) -> Result<(), SimulationError> {
        let event = {
            let mut state = self.state();
            let provider = state
                .provider_mut(name)
                .ok_or_else(|| SimulationError::UnknownProvider(name.to_string()))?;
            if provider.enabled == enabled {
                return Ok(());
            }
            provider.enabled = enabled;

            if enabled && state.is_subscribed(name) {
                Some(PlatformEvent::ProviderEnabled(name.to_string()))
            } else if !enabled && state.is_watching_status() {
                Some(PlatformEvent::ProviderDisabled(name.to_string()))
            } else {
                None
            }
        };

        debug!(provider = name, enabled, "Provider switched");
        if let Some(event) = event {
            self.emit(event);
        }
        Ok(())
    }

    /// Feeds a reading from the reading's provider
    ///
    /// The reading becomes the provider's last known location. Returns
    /// whether it was delivered to a subscriber; readings from disabled
    /// providers are dropped.
    pub fn push_location(&self, raw: RawLocation) -> Result<bool, SimulationError> {
        let delivered = {
            let mut state = self.state();
            let provider = state
                .provider_mut(&raw.provider)
                .ok_or_else(|| SimulationError::UnknownProvider(raw.provider.clone()))?;
            if !provider.enabled {
                debug!(provider = %raw.provider, "Provider is off, dropping reading");
                return Ok(false);
            }
            provider.last_known = Some(raw.clone());
            state.is_subscribed(&raw.provider)
        };

        if delivered {
            self.emit(PlatformEvent::LocationChanged(raw));
        }
        Ok(delivered)
    }

    /// Makes every later call of `operation` fail
    pub fn fail_on(&self, operation: Operation) {
        self.state().failing.insert(operation);
    }

    pub fn clear_failures(&self) {
        self.state().failing.clear();
    }

    /// Number of registrations currently held
    pub fn active_subscriptions(&self) -> usize {
        self.state().registrations.len()
    }

    /// Providers that currently have an update subscription
    pub fn subscribed_providers(&self) -> Vec<String> {
        self.state()
            .registrations
            .values()
            .filter_map(|r| match r {
                Registration::Updates(p) => Some(p.clone()),
                Registration::StatusWatch => None,
            })
            .collect()
    }

    /// Registrations ever granted, status watches included
    pub fn requested_count(&self) -> usize {
        self.state().requested
    }

    /// Registrations ever released
    pub fn removed_count(&self) -> usize {
        self.state().removed
    }
}

#[async_trait]
impl LocationPort for SimulatedLocationService {
    async fn all_providers(&self) -> Result<Vec<String>, PortError> {
        let state = self.state();
        state.check(Operation::AllProviders)?;
        Ok(state.providers.iter().map(|p| p.name.clone()).collect())
    }

    async fn last_known_location(
        &self,
        provider: &str,
    ) -> Result<Option<RawLocation>, PortError> {
        let mut state = self.state();
        state.check(Operation::LastKnownLocation)?;
        state
            .provider_mut(provider)
            .map(|p| p.last_known.clone())
            .ok_or_else(|| PortError::ProviderUnavailable(provider.to_string()))
    }

    async fn best_provider(
        &self,
        criteria: &Criteria,
        enabled_only: bool,
    ) -> Result<Option<String>, PortError> {
        let state = self.state();
        state.check(Operation::BestProvider)?;

        let candidates = state
            .providers
            .iter()
            .filter(|p| p.enabled || !enabled_only);
        let matching = candidates
            .clone()
            .filter(|p| criteria.accuracy == CriteriaAccuracy::Coarse || p.rank <= FINE_RANK_LIMIT)
            .min_by_key(|p| p.rank);

        // Relax the criteria when nothing satisfies them
        Ok(matching
            .or_else(|| candidates.min_by_key(|p| p.rank))
            .map(|p| p.name.clone()))
    }

    async fn request_updates(
        &self,
        provider: &str,
        request: &UpdateRequest,
    ) -> Result<SubscriptionId, PortError> {
        let mut state = self.state();
        state.check(Operation::RequestUpdates)?;
        if state.provider_mut(provider).is_none() {
            return Err(PortError::ProviderUnavailable(provider.to_string()));
        }

        let id = state.allocate(Registration::Updates(provider.to_string()));
        state.requested += 1;
        debug!(
            provider,
            %id,
            interval_ms = request.min_interval_ms,
            distance_m = request.min_distance_meters,
            "Update subscription granted"
        );
        Ok(id)
    }

    async fn remove_updates(&self, subscription: SubscriptionId) -> Result<(), PortError> {
        let mut state = self.state();
        state.check(Operation::RemoveUpdates)?;
        state
            .registrations
            .remove(&subscription)
            .ok_or(PortError::UnknownSubscription(subscription.0))?;
        state.removed += 1;
        debug!(%subscription, "Registration released");
        Ok(())
    }

    async fn watch_provider_status(&self) -> Result<SubscriptionId, PortError> {
        let mut state = self.state();
        state.check(Operation::WatchProviderStatus)?;
        let id = state.allocate(Registration::StatusWatch);
        state.requested += 1;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(provider: &str, time_ms: i64) -> RawLocation {
        RawLocation {
            provider: provider.to_string(),
            latitude: 35.68,
            longitude: 139.69,
            accuracy: Some(12.0),
            time_ms,
        }
    }

    // === Queries ===

    #[tokio::test]
    async fn test_all_providers_in_registration_order() {
        let (sim, _rx) = SimulatedLocationService::with_default_providers();
        sim.register_provider("passive", 50, true, None);

        assert_eq!(
            sim.all_providers().await.unwrap(),
            vec!["gps", "network", "passive"]
        );
    }

    #[tokio::test]
    async fn test_last_known_location() {
        let (sim, _rx) = SimulatedLocationService::new();
        sim.register_provider("gps", 1, true, Some(reading("gps", 100)));
        sim.register_provider("network", 20, true, None);

        let gps = sim.last_known_location("gps").await.unwrap();
        assert_eq!(gps.unwrap().time_ms, 100);
        assert!(sim.last_known_location("network").await.unwrap().is_none());
        assert!(matches!(
            sim.last_known_location("fused").await,
            Err(PortError::ProviderUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_best_provider_respects_enabled_flag() {
        let (sim, _rx) = SimulatedLocationService::new();
        sim.register_provider("network", 20, true, None);
        sim.register_provider("gps", 1, false, None);
        let fine = Criteria::fine();

        assert_eq!(
            sim.best_provider(&fine, false).await.unwrap().as_deref(),
            Some("gps")
        );
        // Nothing enabled is fine enough, so the criteria are relaxed
        assert_eq!(
            sim.best_provider(&fine, true).await.unwrap().as_deref(),
            Some("network")
        );
    }

    #[tokio::test]
    async fn test_best_provider_empty() {
        let (sim, _rx) = SimulatedLocationService::new();
        assert!(sim
            .best_provider(&Criteria::fine(), false)
            .await
            .unwrap()
            .is_none());
    }

    // === Subscriptions ===

    #[tokio::test]
    async fn test_subscribe_and_remove() {
        let (sim, _rx) = SimulatedLocationService::with_default_providers();

        let id = sim
            .request_updates("gps", &UpdateRequest::default())
            .await
            .unwrap();
        let watch = sim.watch_provider_status().await.unwrap();
        assert_eq!(sim.active_subscriptions(), 2);
        assert_eq!(sim.subscribed_providers(), vec!["gps"]);

        sim.remove_updates(id).await.unwrap();
        sim.remove_updates(watch).await.unwrap();
        assert_eq!(sim.active_subscriptions(), 0);
        assert_eq!(sim.requested_count(), 2);
        assert_eq!(sim.removed_count(), 2);

        assert_eq!(
            sim.remove_updates(id).await,
            Err(PortError::UnknownSubscription(id.0))
        );
    }

    #[tokio::test]
    async fn test_subscribe_to_unknown_provider() {
        let (sim, _rx) = SimulatedLocationService::with_default_providers();
        let result = sim
            .request_updates("fused", &UpdateRequest::default())
            .await;
        assert!(matches!(result, Err(PortError::ProviderUnavailable(_))));
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let (sim, _rx) = SimulatedLocationService::with_default_providers();
        sim.fail_on(Operation::RequestUpdates);

        let result = sim
            .request_updates("gps", &UpdateRequest::default())
            .await;
        assert!(matches!(result, Err(PortError::Platform(_))));
        assert!(sim.watch_provider_status().await.is_ok());

        sim.clear_failures();
        assert!(sim
            .request_updates("gps", &UpdateRequest::default())
            .await
            .is_ok());
    }

    // === Events ===

    #[tokio::test]
    async fn test_push_location_reaches_subscribers_only() {
        let (sim, mut rx) = SimulatedLocationService::with_default_providers();
        sim.request_updates("gps", &UpdateRequest::default())
            .await
            .unwrap();

        assert!(sim.push_location(reading("gps", 1)).unwrap());
        assert!(!sim.push_location(reading("network", 2)).unwrap());

        assert_eq!(
            rx.try_recv().unwrap(),
            PlatformEvent::LocationChanged(reading("gps", 1))
        );
        assert!(rx.try_recv().is_err());
        // Undelivered readings still update the last known location
        let network = sim.last_known_location("network").await.unwrap();
        assert_eq!(network.unwrap().time_ms, 2);
    }

    #[tokio::test]
    async fn test_push_location_from_disabled_provider_is_dropped() {
        let (sim, mut rx) = SimulatedLocationService::with_default_providers();
        sim.request_updates("gps", &UpdateRequest::default())
            .await
            .unwrap();
        sim.set_enabled("gps", false).unwrap();

        assert!(!sim.push_location(reading("gps", 1)).unwrap());
        assert!(rx.try_recv().is_err());
        assert_eq!(
            sim.push_location(reading("fused", 1)),
            Err(SimulationError::UnknownProvider("fused".to_string()))
        );
    }

    #[tokio::test]
    async fn test_status_notifications() {
        let (sim, mut rx) = SimulatedLocationService::with_default_providers();
        sim.register_provider("fused", 0, false, None);

        // Nobody watching yet
        sim.set_enabled("network", false).unwrap();
        assert!(rx.try_recv().is_err());

        sim.watch_provider_status().await.unwrap();
        sim.request_updates("fused", &UpdateRequest::unthrottled())
            .await
            .unwrap();

        sim.set_enabled("gps", false).unwrap();
        sim.set_enabled("gps", false).unwrap();
        sim.set_enabled("fused", true).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            PlatformEvent::ProviderDisabled("gps".to_string())
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            PlatformEvent::ProviderEnabled("fused".to_string())
        );
        assert!(rx.try_recv().is_err());
    }
}
