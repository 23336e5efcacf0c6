//! Location tracking coordinator
//!
//! `LocationTracker` owns the lifecycle of a tracking session: it subscribes
//! to every reachable provider, folds incoming fixes through the comparator
//! and tears everything down again on stop or when the session deadline
//! passes. It never calls listener code; every operation queues
//! `TrackerNotice`s that the caller drains with `take_notices`.
//!
//! All port failures are logged and degrade to "this provider is not
//! available". Nothing escapes to the caller.

use crate::comparator::{select_better, ComparatorThresholds};
use crate::config::{Config, MAX_SESSION_TIMEOUT_SECS};
use crate::error::TeardownError;
use crate::fix::LocationFix;
use crate::ports::location::{
    Criteria, LocationPort, PlatformEvent, PortError, SubscriptionId, UpdateRequest,
    GPS_PROVIDER, NETWORK_PROVIDER,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Coordinator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    Tracking,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The caller asked for it
    Requested,
    /// The session deadline passed
    DeadlineElapsed,
    /// A provider was switched off; a new session follows immediately
    ProviderDisabled,
    /// The preferred provider came online; a new session follows immediately
    BetterProviderEnabled,
    /// The owning service is shutting down
    Shutdown,
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Requested => write!(f, "requested"),
            StopReason::DeadlineElapsed => write!(f, "deadline elapsed"),
            StopReason::ProviderDisabled => write!(f, "provider disabled"),
            StopReason::BetterProviderEnabled => write!(f, "better provider enabled"),
            StopReason::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Something listeners should hear about
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerNotice {
    Started,
    Stopped(StopReason),
    LocationUpdated(LocationFix),
}

/// Runtime parameters of a tracker
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSettings {
    pub thresholds: ComparatorThresholds,
    pub update_request: UpdateRequest,
    pub session_timeout: Duration,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            thresholds: ComparatorThresholds::default(),
            update_request: UpdateRequest::default(),
            session_timeout: Duration::from_secs(60),
        }
    }
}

impl TrackerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            thresholds: config.comparator(),
            update_request: config.update_request(),
            session_timeout: config.session_timeout(),
        }
    }
}

/// Deadline of a session starting at `now`
///
/// Timeouts beyond `MAX_SESSION_TIMEOUT_SECS` are capped, so settings built
/// without going through `Config::validate` cannot overflow the clock.
fn session_deadline(now: Instant, timeout: Duration) -> Instant {
    let cap = Duration::from_secs(MAX_SESSION_TIMEOUT_SECS);
    now.checked_add(timeout.min(cap))
        .or_else(|| now.checked_add(cap))
        .unwrap_or(now)
}

/// Registrations held by one session
#[derive(Debug, Default)]
struct Subscriptions {
    /// Preferred provider that is not currently available, watched for enable
    better_provider: Option<(String, SubscriptionId)>,
    gps: Option<SubscriptionId>,
    network: Option<SubscriptionId>,
    status_watch: Option<SubscriptionId>,
}

impl Subscriptions {
    fn count(&self) -> usize {
        [
            self.better_provider.as_ref().map(|(_, id)| *id),
            self.gps,
            self.network,
            self.status_watch,
        ]
        .iter()
        .flatten()
        .count()
    }
}

#[derive(Debug)]
struct Session {
    id: u64,
    deadline: Instant,
    subscriptions: Subscriptions,
}

/// The tracking coordinator
///
/// At most one session is active per tracker. Construct one tracker per
/// process and hand it to whoever needs it.
pub struct LocationTracker<P>
where
    P: LocationPort + ?Sized,
{
    port: Arc<P>,
    settings: TrackerSettings,
    session: Option<Session>,
    /// Last fix handed to listeners, NONE until the first one
    best_fix: LocationFix,
    sessions_started: u64,
    notices: Vec<TrackerNotice>,
}

impl<P> LocationTracker<P>
where
    P: LocationPort + ?Sized,
{
    pub fn new(port: Arc<P>, settings: TrackerSettings) -> Self {
        Self {
            port,
            settings,
            session: None,
            best_fix: LocationFix::none(),
            sessions_started: 0,
            notices: Vec::new(),
        }
    }

    pub fn state(&self) -> TrackingState {
        if self.session.is_some() {
            TrackingState::Tracking
        } else {
            TrackingState::Idle
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.session.is_some()
    }

    /// Best fix delivered so far (NONE if there was none)
    pub fn best_fix(&self) -> &LocationFix {
        &self.best_fix
    }

    /// Id of the running session
    pub fn session_id(&self) -> Option<u64> {
        self.session.as_ref().map(|s| s.id)
    }

    /// When the running session stops on its own
    pub fn deadline(&self) -> Option<Instant> {
        self.session.as_ref().map(|s| s.deadline)
    }

    /// Number of platform registrations currently held
    pub fn active_subscriptions(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, |s| s.subscriptions.count())
    }

    pub fn settings(&self) -> &TrackerSettings {
        &self.settings
    }

    /// Drain the notices queued by previous operations, oldest first
    pub fn take_notices(&mut self) -> Vec<TrackerNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Begin a tracking session
    ///
    /// Returns `false` without touching anything if a session is already
    /// running.
    pub async fn start(&mut self) -> bool {
        if self.session.is_some() {
            debug!("Location tracking is running, ignoring start");
            return false;
        }

        self.sessions_started += 1;
        let session_id = self.sessions_started;
        info!(session = session_id, "Starting location tracking");
        self.notices.push(TrackerNotice::Started);

        self.seed_from_last_known().await;

        let mut subscriptions = Subscriptions {
            better_provider: self.watch_better_provider().await,
            ..Subscriptions::default()
        };

        let providers = match self.port.all_providers().await {
            Ok(providers) => providers,
            Err(e) => {
                warn!("Cannot list location providers: {}", e);
                Vec::new()
            }
        };
        let request = self.settings.update_request;
        subscriptions.gps = self.subscribe_if_present(&providers, GPS_PROVIDER, &request).await;
        subscriptions.network = self
            .subscribe_if_present(&providers, NETWORK_PROVIDER, &request)
            .await;

        subscriptions.status_watch = match self.port.watch_provider_status().await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Cannot watch provider status: {}", e);
                None
            }
        };

        let session = Session {
            id: session_id,
            deadline: session_deadline(Instant::now(), self.settings.session_timeout),
            subscriptions,
        };
        debug!(
            session = session.id,
            subscriptions = session.subscriptions.count(),
            timeout = ?self.settings.session_timeout,
            "Location tracking started"
        );
        self.session = Some(session);

        true
    }

    /// End the running session
    ///
    /// Returns `false` if there was nothing to stop. Each registration is
    /// removed independently; a failure is logged and the rest still go.
    pub async fn stop(&mut self, reason: StopReason) -> bool {
        let Some(session) = self.session.take() else {
            debug!("Location tracking is not running, ignoring stop");
            return false;
        };

        info!(session = session.id, %reason, "Stopping location tracking");
        let Subscriptions {
            better_provider,
            gps,
            network,
            status_watch,
        } = session.subscriptions;

        self.remove("better provider watch", better_provider.map(|(_, id)| id))
            .await;
        self.remove("gps updates", gps).await;
        self.remove("provider status watch", status_watch).await;
        self.remove("network updates", network).await;

        self.notices.push(TrackerNotice::Stopped(reason));
        true
    }

    /// React to a platform notification
    pub async fn handle_event(&mut self, event: PlatformEvent) {
        let Some(session) = self.session.as_ref() else {
            debug!(?event, "Not tracking, ignoring platform event");
            return;
        };

        match event {
            PlatformEvent::LocationChanged(raw) => {
                let fix = match LocationFix::from_raw(Some(raw)) {
                    Ok(fix) => fix,
                    Err(e) => {
                        warn!("Dropping location update: {}", e);
                        return;
                    }
                };
                self.offer(fix);
            }
            PlatformEvent::ProviderDisabled(provider) => {
                if session.subscriptions.status_watch.is_none() {
                    return;
                }
                debug!(%provider, "Provider disabled, restarting location tracking");
                self.restart(StopReason::ProviderDisabled).await;
            }
            PlatformEvent::ProviderEnabled(provider) => {
                let is_watched = session
                    .subscriptions
                    .better_provider
                    .as_ref()
                    .is_some_and(|(watched, _)| *watched == provider);
                if is_watched {
                    debug!(%provider, "Better provider enabled, restarting location tracking");
                    self.restart(StopReason::BetterProviderEnabled).await;
                }
            }
        }
    }

    /// The deadline armed by session `session_id` fired
    ///
    /// Deadlines of sessions that already ended are ignored.
    pub async fn on_deadline(&mut self, session_id: u64) {
        if self.session_id() == Some(session_id) {
            debug!(session = session_id, "Tracking deadline elapsed");
            self.stop(StopReason::DeadlineElapsed).await;
        }
    }

    async fn restart(&mut self, reason: StopReason) {
        self.stop(reason).await;
        self.start().await;
    }

    /// Fold a new fix into the best one and queue an update if it won
    fn offer(&mut self, fix: LocationFix) {
        let best = select_better(&fix, &self.best_fix, &self.settings.thresholds);
        if best.is_none() || best == self.best_fix {
            debug!(%fix, "Location update rejected");
            return;
        }
        debug!(%best, "Accepted better location");
        self.best_fix = best.clone();
        self.notices.push(TrackerNotice::LocationUpdated(best));
    }

    /// Report the better of the last known gps and network fixes
    async fn seed_from_last_known(&mut self) {
        let gps = self.last_known(GPS_PROVIDER).await;
        let network = self.last_known(NETWORK_PROVIDER).await;
        let last_known = select_better(&gps, &network, &self.settings.thresholds);
        let best = select_better(&last_known, &self.best_fix, &self.settings.thresholds);

        if best.is_none() {
            debug!("No last known location");
            return;
        }
        self.best_fix = best.clone();
        self.notices.push(TrackerNotice::LocationUpdated(best));
    }

    async fn last_known(&self, provider: &str) -> LocationFix {
        let raw = match self.port.last_known_location(provider).await {
            Ok(raw) => raw,
            Err(e) => {
                debug!(provider, "No last known location: {}", e);
                return LocationFix::none();
            }
        };
        LocationFix::from_raw(raw).unwrap_or_else(|e| {
            debug!(provider, "{}", e);
            LocationFix::none()
        })
    }

    /// Subscribe to the best provider if it is currently unavailable
    ///
    /// The subscription only exists so that the platform tells us when that
    /// provider comes online.
    async fn watch_better_provider(&self) -> Option<(String, SubscriptionId)> {
        let criteria = Criteria::fine();
        let best = self.best_provider(&criteria, false).await?;
        let best_available = self.best_provider(&criteria, true).await;

        if best_available.as_deref() == Some(best.as_str()) {
            debug!(provider = %best, "Best provider is already available");
            return None;
        }

        match self
            .port
            .request_updates(&best, &UpdateRequest::unthrottled())
            .await
        {
            Ok(id) => {
                debug!(provider = %best, %id, "Watching unavailable best provider");
                Some((best, id))
            }
            Err(e) => {
                warn!(provider = %best, "Cannot watch best provider: {}", e);
                None
            }
        }
    }

    async fn best_provider(&self, criteria: &Criteria, enabled_only: bool) -> Option<String> {
        match self.port.best_provider(criteria, enabled_only).await {
            Ok(provider) => provider,
            Err(e) => {
                warn!(enabled_only, "Best provider lookup failed: {}", e);
                None
            }
        }
    }

    async fn subscribe_if_present(
        &self,
        providers: &[String],
        provider: &str,
        request: &UpdateRequest,
    ) -> Option<SubscriptionId> {
        if !providers.iter().any(|p| p == provider) {
            debug!(provider, "Provider not present on this device");
            return None;
        }

        match self.port.request_updates(provider, request).await {
            Ok(id) => {
                debug!(provider, %id, "Subscribed to location updates");
                Some(id)
            }
            Err(e @ PortError::ProviderUnavailable(_)) => {
                debug!(provider, "{}", e);
                None
            }
            Err(e) => {
                warn!(provider, "Cannot subscribe to location updates: {}", e);
                None
            }
        }
    }

    async fn remove(&self, what: &'static str, subscription: Option<SubscriptionId>) {
        let Some(subscription) = subscription else {
            return;
        };
        if let Err(source) = self.port.remove_updates(subscription).await {
            let err = TeardownError {
                what,
                subscription,
                source,
            };
            warn!("{}", err);
        }
    }
}
