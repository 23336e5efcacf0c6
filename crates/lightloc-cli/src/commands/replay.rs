//! Replay command
//!
//! Handles `lightloc replay <trace.jsonl>`: runs a tracking session over a
//! simulated device and prints every location the coordinator accepts.

use anyhow::{Context, Result};
use lightloc_adapters::{parse_trace, ReplaySummary, SimulatedLocationService, TraceReplayer};
use lightloc_core::{
    Config, LocationFix, StopReason, TrackingListener, TrackingService, TrackingStatus,
};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// Replay settings taken from the command line
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayOptions {
    /// Playback speed multiplier; infinite plays without waiting
    pub speed: f64,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self { speed: 1.0 }
    }
}

/// Prints tracking notices as they arrive
#[derive(Default)]
struct ConsoleListener {
    updates: AtomicUsize,
}

impl TrackingListener for ConsoleListener {
    fn on_location_update(&self, fix: &LocationFix) {
        let n = self.updates.fetch_add(1, Ordering::SeqCst) + 1;
        println!("  #{:<3} {}", n, fix);
    }

    fn on_tracking_started(&self) {
        println!("Tracking started");
    }

    fn on_tracking_stopped(&self, reason: StopReason) {
        println!("Tracking stopped ({})", reason);
    }
}

/// Outcome of a replayed session
#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub summary: ReplaySummary,
    /// Coordinator state right after the last trace entry
    pub status: TrackingStatus,
}

/// Replays a trace through a fresh tracking service
///
/// Listeners are registered before tracking starts so they see the whole
/// session.
pub async fn replay(
    config: &Config,
    trace_text: &str,
    options: ReplayOptions,
    listeners: Vec<Arc<dyn TrackingListener>>,
) -> Result<ReplayOutcome> {
    let mut replayer = TraceReplayer::new(parse_trace(trace_text)?).with_speed(options.speed)?;

    let (sim, events) = SimulatedLocationService::new();
    let sim = Arc::new(sim);
    let providers = replayer.prepare(&sim)?;
    info!(providers, entries = replayer.len(), "Trace loaded");

    let handle = TrackingService::spawn(Arc::clone(&sim), events, config);
    for listener in listeners {
        handle.add_listener(listener).await?;
    }

    handle.start().await?;
    let summary = replayer.run(&sim).await?;
    let status = handle.status().await?;
    handle.shutdown().await?;

    Ok(ReplayOutcome { summary, status })
}

pub async fn run(config: &Config, trace: &Path, options: ReplayOptions) -> Result<()> {
    let text = fs::read_to_string(trace)
        .with_context(|| format!("Failed to read trace {}", trace.display()))?;

    let console = Arc::new(ConsoleListener::default());
    let listener: Arc<dyn TrackingListener> = console.clone();
    let outcome = replay(config, &text, options, vec![listener]).await?;

    println!();
    println!("Replay Summary");
    println!("==============");
    println!("  Readings delivered: {}", outcome.summary.delivered);
    println!("  Readings dropped:   {}", outcome.summary.dropped);
    println!("  Provider toggles:   {}", outcome.summary.toggles);
    println!(
        "  Accepted updates:   {}",
        console.updates.load(Ordering::SeqCst)
    );
    println!("  Best location:      {}", outcome.status.best_fix);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Collect {
        fixes: Mutex<Vec<i64>>,
    }

    impl TrackingListener for Collect {
        fn on_location_update(&self, fix: &LocationFix) {
            self.fixes.lock().unwrap().push(fix.timestamp_ms());
        }
    }

    const TRACE: &str = r#"
{"at_ms": 0, "event": {"type": "register", "provider": "gps", "rank": 1}}
{"at_ms": 100, "event": {"type": "location", "provider": "gps", "latitude": 3.0, "longitude": 4.0, "accuracy": 20.0, "time_ms": 100}}
{"at_ms": 200, "event": {"type": "location", "provider": "gps", "latitude": 3.0, "longitude": 4.0, "accuracy": 25.0, "time_ms": 200}}
{"at_ms": 300, "event": {"type": "location", "provider": "gps", "latitude": 3.0, "longitude": 4.0, "accuracy": 500.0, "time_ms": 300}}
"#;

    #[tokio::test]
    async fn test_replay_reports_accepted_fixes() {
        let collect = Arc::new(Collect::default());
        let listener: Arc<dyn TrackingListener> = collect.clone();

        let outcome = replay(
            &Config::default(),
            TRACE,
            ReplayOptions {
                speed: f64::INFINITY,
            },
            vec![listener],
        )
        .await
        .unwrap();

        // The 500 m fix is newer but far too inaccurate
        assert_eq!(*collect.fixes.lock().unwrap(), vec![100, 200]);
        assert_eq!(outcome.summary.delivered, 3);
        assert_eq!(outcome.status.best_fix.timestamp_ms(), 200);
    }

    #[tokio::test]
    async fn test_replay_rejects_bad_speed() {
        let result = replay(
            &Config::default(),
            TRACE,
            ReplayOptions { speed: 0.0 },
            Vec::new(),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_replay_rejects_unschedulable_speed() {
        let err = replay(
            &Config::default(),
            TRACE,
            ReplayOptions { speed: 1e-300 },
            Vec::new(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("cannot be scheduled"));
    }
}
