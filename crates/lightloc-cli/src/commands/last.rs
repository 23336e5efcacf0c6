//! Last command
//!
//! Handles `lightloc last <trace.jsonl>`: sets up the device described by
//! the trace's leading `register` entries and prints the best last known
//! location without subscribing to anything.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use lightloc_adapters::{parse_trace, SimulatedLocationService, TraceReplayer};
use lightloc_core::{find_last_best_location, LocationFix};
use std::fs;
use std::path::Path;

/// Oldest acceptable timestamp given either bound
///
/// `max_age_secs` is measured back from the current wall clock time.
pub fn min_time_ms(min_time_ms: Option<i64>, max_age_secs: Option<u64>) -> Result<i64> {
    match (min_time_ms, max_age_secs) {
        (Some(_), Some(_)) => bail!("--min-time-ms and --max-age-secs are mutually exclusive"),
        (Some(min), None) => Ok(min),
        (None, Some(age)) => {
            let age_ms = i64::try_from(age.saturating_mul(1000)).unwrap_or(i64::MAX);
            Ok(Utc::now().timestamp_millis().saturating_sub(age_ms))
        }
        (None, None) => Ok(i64::MIN),
    }
}

/// Finds the best last known fix on the device the trace sets up
pub async fn find(trace: &Path, min_time_ms: i64) -> Result<Option<LocationFix>> {
    let text = fs::read_to_string(trace)
        .with_context(|| format!("Failed to read trace {}", trace.display()))?;
    let mut replayer = TraceReplayer::new(parse_trace(&text)?);

    let (sim, _events) = SimulatedLocationService::new();
    replayer.prepare(&sim)?;

    Ok(find_last_best_location(&sim, min_time_ms).await)
}

pub async fn run(trace: &Path, min_time: Option<i64>, max_age_secs: Option<u64>) -> Result<()> {
    let min_time = min_time_ms(min_time, max_age_secs)?;

    match find(trace, min_time).await? {
        Some(fix) => {
            println!("Best last known location:");
            println!("  {}", fix);
        }
        None => println!("No provider has a last known location"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_min_time_ms() {
        assert_eq!(min_time_ms(None, None).unwrap(), i64::MIN);
        assert_eq!(min_time_ms(Some(500), None).unwrap(), 500);
        assert!(min_time_ms(Some(500), Some(10)).is_err());

        let now = Utc::now().timestamp_millis();
        let min = min_time_ms(None, Some(60)).unwrap();
        assert!(min <= now - 60_000);
        assert!(min > now - 120_000);
    }

    #[tokio::test]
    async fn test_find_from_trace() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("device.jsonl");
        fs::write(
            &path,
            concat!(
                r#"{"at_ms": 0, "event": {"type": "register", "provider": "gps", "rank": 1, "last_known": {"provider": "gps", "latitude": 1.0, "longitude": 1.0, "accuracy": 40.0, "time_ms": 2000}}}"#,
                "\n",
                r#"{"at_ms": 0, "event": {"type": "register", "provider": "network", "rank": 20, "last_known": {"provider": "network", "latitude": 1.0, "longitude": 1.0, "accuracy": 300.0, "time_ms": 9000}}}"#,
                "\n",
            ),
        )
        .unwrap();

        let fix = find(&path, 1000).await.unwrap().unwrap();
        assert_eq!(fix.source(), "gps");

        // Nothing is fresh enough, so the newest fix wins
        let fix = find(&path, 10_000).await.unwrap().unwrap();
        assert_eq!(fix.source(), "network");
    }
}
