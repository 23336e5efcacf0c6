//! Async tracking service
//!
//! Runs a `LocationTracker` on its own Tokio task. Callers talk to it through
//! a cloneable `TrackingHandle`; platform events arrive on a channel fed by
//! the adapter. Listener callbacks run on a second task so that a listener
//! can call back into the handle without re-entering the tracker.

use crate::config::Config;
use crate::fix::LocationFix;
use crate::listeners::{ListenerHandle, ListenerRegistry, TrackingListener};
use crate::ports::location::{LocationPort, PlatformEvent};
use crate::tracker::{LocationTracker, StopReason, TrackerNotice, TrackerSettings, TrackingState};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Platform events handled in a row before a waiting command is served
pub const EVENT_BURST: usize = 64;

/// Errors visible to users of a `TrackingHandle`
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The service task has ended
    #[error("Tracking service has shut down")]
    Closed,
}

/// Snapshot of the coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingStatus {
    pub state: TrackingState,
    pub best_fix: LocationFix,
    pub active_subscriptions: usize,
    pub session_id: Option<u64>,
}

enum Command {
    Start(oneshot::Sender<bool>),
    Stop(Option<oneshot::Sender<bool>>),
    Status(oneshot::Sender<TrackingStatus>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

enum Dispatch {
    Notice(TrackerNotice),
    Add(Arc<dyn TrackingListener>, oneshot::Sender<ListenerHandle>),
    Remove(ListenerHandle, oneshot::Sender<bool>),
    Barrier(oneshot::Sender<()>),
    Close(oneshot::Sender<()>),
}

/// Handle to a running tracking service
#[derive(Clone)]
pub struct TrackingHandle {
    commands: mpsc::UnboundedSender<Command>,
    dispatch: mpsc::UnboundedSender<Dispatch>,
}

impl TrackingHandle {
    /// Begin a tracking session; `Ok(false)` if one is already running
    pub async fn start(&self) -> Result<bool, ServiceError> {
        self.request(Command::Start).await
    }

    /// End the running session; `Ok(false)` if there was none
    pub async fn stop(&self) -> Result<bool, ServiceError> {
        self.request(|tx| Command::Stop(Some(tx))).await
    }

    /// Ask for the session to end without waiting for it
    ///
    /// Never blocks, so it is safe to call from listener callbacks.
    pub fn request_stop(&self) {
        if self.commands.send(Command::Stop(None)).is_err() {
            debug!("Stop requested after the tracking service shut down");
        }
    }

    /// Register a listener for every later notice
    pub async fn add_listener(
        &self,
        listener: Arc<dyn TrackingListener>,
    ) -> Result<ListenerHandle, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch
            .send(Dispatch::Add(listener, tx))
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    /// Unregister a listener; `Ok(false)` if it was not registered
    pub async fn remove_listener(&self, handle: ListenerHandle) -> Result<bool, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch
            .send(Dispatch::Remove(handle, tx))
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }

    pub async fn status(&self) -> Result<TrackingStatus, ServiceError> {
        self.request(Command::Status).await
    }

    /// Wait until every notice produced so far has reached the listeners
    ///
    /// Must not be awaited from inside a listener callback.
    pub async fn flush(&self) -> Result<(), ServiceError> {
        self.request(Command::Flush).await
    }

    /// Stop any session, deliver the remaining notices and end the service
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        self.request(Command::Shutdown).await
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ServiceError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .map_err(|_| ServiceError::Closed)?;
        rx.await.map_err(|_| ServiceError::Closed)
    }
}

/// Owns the tracker and serialises everything that touches it
pub struct TrackingService<P>
where
    P: LocationPort + ?Sized + 'static,
{
    tracker: LocationTracker<P>,
    commands: mpsc::UnboundedReceiver<Command>,
    events: mpsc::UnboundedReceiver<PlatformEvent>,
    dispatch: mpsc::UnboundedSender<Dispatch>,
}

impl<P> TrackingService<P>
where
    P: LocationPort + ?Sized + 'static,
{
    /// Spawn the service with settings taken from `config`
    pub fn spawn(
        port: Arc<P>,
        events: mpsc::UnboundedReceiver<PlatformEvent>,
        config: &Config,
    ) -> TrackingHandle {
        Self::spawn_with_settings(port, events, TrackerSettings::from_config(config))
    }

    pub fn spawn_with_settings(
        port: Arc<P>,
        events: mpsc::UnboundedReceiver<PlatformEvent>,
        settings: TrackerSettings,
    ) -> TrackingHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (dispatch_tx, dispatch_rx) = mpsc::unbounded_channel();

        let service = Self {
            tracker: LocationTracker::new(port, settings),
            commands: command_rx,
            events,
            dispatch: dispatch_tx.clone(),
        };

        tokio::spawn(run_dispatcher(dispatch_rx));
        tokio::spawn(service.run());

        TrackingHandle {
            commands: command_tx,
            dispatch: dispatch_tx,
        }
    }

    async fn run(mut self) {
        info!("Tracking service started");
        let mut events_open = true;
        let mut burst = 0;

        loop {
            // A pending command gets a turn after every EVENT_BURST events
            if burst >= EVENT_BURST {
                burst = 0;
                if let Ok(command) = self.commands.try_recv() {
                    if self.on_command(Some(command)).await {
                        break;
                    }
                    self.flush_notices();
                    continue;
                }
            }

            let deadline = self.tracker.deadline();
            let session = self.tracker.session_id();

            // Platform events already queued are handled before a later command
            tokio::select! {
                biased;

                _ = sleep_until(deadline) => {
                    burst = 0;
                    if let Some(session) = session {
                        self.tracker.on_deadline(session).await;
                    }
                }
                event = self.events.recv(), if events_open => {
                    match event {
                        Some(event) => {
                            burst += 1;
                            self.tracker.handle_event(event).await;
                        }
                        None => {
                            debug!("Platform event channel closed");
                            events_open = false;
                        }
                    }
                }
                command = self.commands.recv() => {
                    burst = 0;
                    if self.on_command(command).await {
                        break;
                    }
                }
            }

            self.flush_notices();
        }

        info!("Tracking service stopped");
    }

    /// Returns true when the loop should end
    async fn on_command(&mut self, command: Option<Command>) -> bool {
        let Some(command) = command else {
            debug!("All tracking handles dropped");
            self.tracker.stop(StopReason::Shutdown).await;
            self.flush_notices();
            return true;
        };
        match self.handle_command(command).await {
            Some(ack) => {
                self.flush_notices();
                if self.dispatch.send(Dispatch::Close(ack)).is_err() {
                    warn!("Listener dispatcher ended early");
                }
                true
            }
            None => false,
        }
    }

    /// Returns the shutdown acknowledgement when the loop should end
    async fn handle_command(&mut self, command: Command) -> Option<oneshot::Sender<()>> {
        match command {
            Command::Start(reply) => {
                let started = self.tracker.start().await;
                let _ = reply.send(started);
            }
            Command::Stop(reply) => {
                let stopped = self.tracker.stop(StopReason::Requested).await;
                if let Some(reply) = reply {
                    let _ = reply.send(stopped);
                }
            }
            Command::Status(reply) => {
                let _ = reply.send(TrackingStatus {
                    state: self.tracker.state(),
                    best_fix: self.tracker.best_fix().clone(),
                    active_subscriptions: self.tracker.active_subscriptions(),
                    session_id: self.tracker.session_id(),
                });
            }
            Command::Flush(reply) => {
                // A closed dispatcher drops the reply, which the caller sees as Closed
                self.flush_notices();
                let _ = self.dispatch.send(Dispatch::Barrier(reply));
            }
            Command::Shutdown(ack) => {
                info!("Shutting down tracking service");
                self.tracker.stop(StopReason::Shutdown).await;
                return Some(ack);
            }
        }
        None
    }

    fn flush_notices(&mut self) {
        for notice in self.tracker.take_notices() {
            if self.dispatch.send(Dispatch::Notice(notice)).is_err() {
                warn!("Listener dispatcher ended, dropping notice");
            }
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn run_dispatcher(mut inbox: mpsc::UnboundedReceiver<Dispatch>) {
    let mut registry = ListenerRegistry::new();

    while let Some(message) = inbox.recv().await {
        match message {
            Dispatch::Notice(notice) => registry.dispatch(&notice),
            Dispatch::Add(listener, reply) => {
                let handle = registry.add(listener);
                debug!(listener = handle.id(), "Listener added");
                let _ = reply.send(handle);
            }
            Dispatch::Remove(handle, reply) => {
                let _ = reply.send(registry.remove(handle));
            }
            Dispatch::Barrier(reply) => {
                let _ = reply.send(());
            }
            Dispatch::Close(ack) => {
                let _ = ack.send(());
                break;
            }
        }
    }

    debug!("Listener dispatcher stopped");
}
