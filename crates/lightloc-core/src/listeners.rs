//! Multi-subscriber listener registry
//!
//! Any number of listeners can watch a tracker. Each registration gets a
//! handle that removes it again; dispatch visits listeners in registration
//! order.

use crate::fix::LocationFix;
use crate::tracker::{StopReason, TrackerNotice};
use std::sync::Arc;
use tracing::trace;

/// Receiver of tracking notifications
pub trait TrackingListener: Send + Sync {
    /// A better fix was accepted; never called with the NONE sentinel
    fn on_location_update(&self, fix: &LocationFix);

    /// A tracking session began
    fn on_tracking_started(&self) {}

    /// A tracking session ended
    fn on_tracking_stopped(&self, _reason: StopReason) {}
}

/// Adapts a closure into a listener that only cares about location updates
pub struct FnListener<F>(pub F);

impl<F> TrackingListener for FnListener<F>
where
    F: Fn(&LocationFix) + Send + Sync,
{
    fn on_location_update(&self, fix: &LocationFix) {
        (self.0)(fix)
    }
}

/// Registration handle returned by `ListenerRegistry::add`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

impl ListenerHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Ordered set of registered listeners
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    listeners: Vec<(ListenerHandle, Arc<dyn TrackingListener>)>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn add(&mut self, listener: Arc<dyn TrackingListener>) -> ListenerHandle {
        self.next_id += 1;
        let handle = ListenerHandle(self.next_id);
        self.listeners.push((handle, listener));
        handle
    }

    /// Unregister a listener; returns false if the handle was not registered
    pub fn remove(&mut self, handle: ListenerHandle) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(h, _)| *h != handle);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver one notice to every listener
    pub fn dispatch(&self, notice: &TrackerNotice) {
        trace!(listeners = self.listeners.len(), ?notice, "Dispatching notice");
        for (_, listener) in &self.listeners {
            match notice {
                TrackerNotice::Started => listener.on_tracking_started(),
                TrackerNotice::Stopped(reason) => listener.on_tracking_stopped(*reason),
                TrackerNotice::LocationUpdated(fix) => {
                    if !fix.is_none() {
                        listener.on_location_update(fix);
                    }
                }
            }
        }
    }
}
