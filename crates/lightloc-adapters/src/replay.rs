//! Recorded trace replay
//!
//! A trace is a JSON-lines file. Each line carries an offset in
//! milliseconds from the start of the replay and one platform event:
//!
//! ```text
//! {"at_ms": 0, "event": {"type": "register", "provider": "gps", "rank": 1}}
//! {"at_ms": 1000, "event": {"type": "location", "provider": "gps", "latitude": 1.0, "longitude": 2.0, "accuracy": 5.0, "time_ms": 1000}}
//! {"at_ms": 4000, "event": {"type": "disable", "provider": "gps"}}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use crate::simulated::{SimulatedLocationService, SimulationError};
use lightloc_core::ports::location::RawLocation;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

/// Errors raised while loading or replaying a trace
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Line {line}: offset {at_ms} ms is earlier than the previous entry")]
    OutOfOrder { line: usize, at_ms: u64 },

    #[error("Replay speed must be a positive number, got {0}")]
    InvalidSpeed(f64),

    #[error("Offset {at_ms} ms cannot be scheduled at speed {speed}")]
    OffsetOutOfRange { at_ms: u64, speed: f64 },

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimulationError),
}

/// One event of a trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TraceEvent {
    Location(RawLocation),
    Enable {
        provider: String,
    },
    Disable {
        provider: String,
    },
    Register {
        provider: String,
        rank: u32,
        #[serde(default = "default_enabled")]
        enabled: bool,
        #[serde(default)]
        last_known: Option<RawLocation>,
    },
}

fn default_enabled() -> bool {
    true
}

/// A trace event with its offset from the start of the replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub at_ms: u64,
    pub event: TraceEvent,
}

/// Parses a JSON-lines trace
///
/// Offsets must not decrease from one entry to the next.
pub fn parse_trace(text: &str) -> Result<Vec<TraceEntry>, ReplayError> {
    let mut entries: Vec<TraceEntry> = Vec::new();

    for (index, raw_line) in text.lines().enumerate() {
        let line = index + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let entry: TraceEntry =
            serde_json::from_str(trimmed).map_err(|source| ReplayError::Parse { line, source })?;
        if entries.last().is_some_and(|prev| entry.at_ms < prev.at_ms) {
            return Err(ReplayError::OutOfOrder {
                line,
                at_ms: entry.at_ms,
            });
        }
        entries.push(entry);
    }

    Ok(entries)
}

/// What a replay did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub registered: usize,
    pub delivered: usize,
    pub dropped: usize,
    pub toggles: usize,
}

/// Feeds a parsed trace into a simulated location service
pub struct TraceReplayer {
    entries: Vec<TraceEntry>,
    speed: f64,
}

impl TraceReplayer {
    pub fn new(entries: Vec<TraceEntry>) -> Self {
        Self {
            entries,
            speed: 1.0,
        }
    }

    /// Replays `speed` times faster than recorded
    ///
    /// `f64::INFINITY` replays without waiting at all.
    pub fn with_speed(mut self, speed: f64) -> Result<Self, ReplayError> {
        if speed.is_nan() || speed <= 0.0 {
            return Err(ReplayError::InvalidSpeed(speed));
        }
        self.speed = speed;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Applies the provider registrations at the head of the trace
    ///
    /// Lets the caller set up the device before tracking starts; `run`
    /// plays whatever remains.
    pub fn prepare(&mut self, sim: &SimulatedLocationService) -> Result<usize, ReplayError> {
        let setup = self
            .entries
            .iter()
            .take_while(|e| matches!(e.event, TraceEvent::Register { .. }))
            .count();

        let mut summary = ReplaySummary::default();
        for entry in self.entries.drain(..setup) {
            apply(sim, entry.event, &mut summary)?;
        }
        debug!(providers = setup, "Trace setup applied");
        Ok(setup)
    }

    /// Plays the trace, sleeping between entries to honour their offsets
    pub async fn run(self, sim: &SimulatedLocationService) -> Result<ReplaySummary, ReplayError> {
        let started = Instant::now();
        let mut summary = ReplaySummary::default();
        info!(entries = self.entries.len(), speed = self.speed, "Replaying trace");

        for entry in self.entries {
            if self.speed.is_finite() {
                let target = Duration::try_from_secs_f64(entry.at_ms as f64 / 1000.0 / self.speed)
                    .ok()
                    .and_then(|offset| started.checked_add(offset))
                    .ok_or(ReplayError::OffsetOutOfRange {
                        at_ms: entry.at_ms,
                        speed: self.speed,
                    })?;
                tokio::time::sleep_until(target).await;
            }
            apply(sim, entry.event, &mut summary)?;
        }

        info!(
            delivered = summary.delivered,
            dropped = summary.dropped,
            "Trace replay finished"
        );
        Ok(summary)
    }
}

fn apply(
    sim: &SimulatedLocationService,
    event: TraceEvent,
    summary: &mut ReplaySummary,
) -> Result<(), ReplayError> {
    match event {
        TraceEvent::Location(raw) => {
            if sim.push_location(raw)? {
                summary.delivered += 1;
            } else {
                summary.dropped += 1;
            }
        }
        TraceEvent::Enable { provider } => {
            sim.set_enabled(&provider, true)?;
            summary.toggles += 1;
        }
        TraceEvent::Disable { provider } => {
            sim.set_enabled(&provider, false)?;
            summary.toggles += 1;
        }
        TraceEvent::Register {
            provider,
            rank,
            enabled,
            last_known,
        } => {
            sim.register_provider(&provider, rank, enabled, last_known);
            summary.registered += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightloc_core::ports::location::{LocationPort, PlatformEvent, UpdateRequest};

    const TRACE: &str = r#"
# two providers, gps starts with a cached fix
{"at_ms": 0, "event": {"type": "register", "provider": "gps", "rank": 1, "last_known": {"provider": "gps", "latitude": 1.0, "longitude": 2.0, "accuracy": 30.0, "time_ms": 0}}}
{"at_ms": 0, "event": {"type": "register", "provider": "network", "rank": 20, "enabled": false}}

{"at_ms": 1000, "event": {"type": "location", "provider": "gps", "latitude": 1.0, "longitude": 2.0, "accuracy": 5.0, "time_ms": 1000}}
{"at_ms": 2000, "event": {"type": "enable", "provider": "network"}}
{"at_ms": 3000, "event": {"type": "location", "provider": "network", "latitude": 1.1, "longitude": 2.1, "time_ms": 3000}}
"#;

    #[test]
    fn test_parse_trace() {
        let entries = parse_trace(TRACE).unwrap();
        assert_eq!(entries.len(), 5);
        assert_eq!(
            entries[1].event,
            TraceEvent::Register {
                provider: "network".to_string(),
                rank: 20,
                enabled: false,
                last_known: None,
            }
        );
        match &entries[4].event {
            TraceEvent::Location(raw) => {
                assert_eq!(raw.provider, "network");
                assert!(raw.accuracy.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_parse_error_reports_line() {
        let text = "{\"at_ms\": 0, \"event\": {\"type\": \"enable\", \"provider\": \"gps\"}}\n\n{oops}";
        let err = parse_trace(text).unwrap_err();
        assert!(matches!(err, ReplayError::Parse { line: 3, .. }));
        assert!(err.to_string().starts_with("Line 3:"));
    }

    #[test]
    fn test_unknown_event_type_is_rejected() {
        let text = r#"{"at_ms": 0, "event": {"type": "teleport", "provider": "gps"}}"#;
        assert!(matches!(
            parse_trace(text),
            Err(ReplayError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_out_of_order_offsets_are_rejected() {
        let text = concat!(
            r#"{"at_ms": 500, "event": {"type": "enable", "provider": "gps"}}"#,
            "\n",
            r#"{"at_ms": 100, "event": {"type": "disable", "provider": "gps"}}"#,
        );
        assert!(matches!(
            parse_trace(text),
            Err(ReplayError::OutOfOrder { line: 2, at_ms: 100 })
        ));
    }

    #[test]
    fn test_invalid_speed() {
        for speed in [0.0, -1.0, f64::NAN] {
            assert!(TraceReplayer::new(Vec::new()).with_speed(speed).is_err());
        }
        assert!(TraceReplayer::new(Vec::new())
            .with_speed(f64::INFINITY)
            .is_ok());
    }

    #[tokio::test]
    async fn test_prepare_applies_leading_registrations() {
        let (sim, _rx) = SimulatedLocationService::new();
        let mut replayer = TraceReplayer::new(parse_trace(TRACE).unwrap());

        assert_eq!(replayer.prepare(&sim).unwrap(), 2);
        assert_eq!(replayer.len(), 3);
        assert_eq!(sim.all_providers().await.unwrap(), vec!["gps", "network"]);
        let cached = sim.last_known_location("gps").await.unwrap().unwrap();
        assert_eq!(cached.accuracy, Some(30.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_honours_offsets() {
        let (sim, mut rx) = SimulatedLocationService::new();
        let mut replayer = TraceReplayer::new(parse_trace(TRACE).unwrap())
            .with_speed(2.0)
            .unwrap();
        replayer.prepare(&sim).unwrap();
        sim.request_updates("gps", &UpdateRequest::default())
            .await
            .unwrap();
        sim.request_updates("network", &UpdateRequest::default())
            .await
            .unwrap();

        let started = Instant::now();
        let summary = replayer.run(&sim).await.unwrap();

        // Last entry sits at 3 s, replayed at double speed
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(1600));
        assert_eq!(
            summary,
            ReplaySummary {
                registered: 0,
                delivered: 2,
                dropped: 0,
                toggles: 1,
            }
        );

        assert!(matches!(rx.try_recv(), Ok(PlatformEvent::LocationChanged(_))));
        assert_eq!(
            rx.try_recv().unwrap(),
            PlatformEvent::ProviderEnabled("network".to_string())
        );
        assert!(matches!(rx.try_recv(), Ok(PlatformEvent::LocationChanged(_))));
    }

    #[tokio::test]
    async fn test_unschedulable_offset_is_an_error() {
        let (sim, _rx) = SimulatedLocationService::new();
        sim.register_provider("gps", 1, false, None);
        let entries =
            parse_trace(r#"{"at_ms": 1000, "event": {"type": "enable", "provider": "gps"}}"#)
                .unwrap();

        let err = TraceReplayer::new(entries)
            .with_speed(1e-300)
            .unwrap()
            .run(&sim)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReplayError::OffsetOutOfRange { at_ms: 1000, .. }
        ));
        // Nothing was applied
        assert_eq!(sim.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_run_fails_on_unknown_provider() {
        let (sim, _rx) = SimulatedLocationService::new();
        let entries =
            parse_trace(r#"{"at_ms": 0, "event": {"type": "disable", "provider": "gps"}}"#).unwrap();

        let err = TraceReplayer::new(entries).run(&sim).await.unwrap_err();
        assert!(matches!(
            err,
            ReplayError::Simulation(SimulationError::UnknownProvider(_))
        ));
    }
}
