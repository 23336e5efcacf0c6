//! Compare command
//!
//! Handles `lightloc compare <candidate.json> <current.json>`. Each file
//! holds one platform reading as JSON, or `null` for "no fix".

use anyhow::{Context, Result};
use lightloc_core::{select_better, ComparatorThresholds, Config, LocationFix, RawLocation};
use std::fmt;
use std::fs;
use std::path::Path;

/// Which of the two fixes the comparator kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Candidate,
    Current,
    /// Neither input is a fix
    Neither,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Candidate => write!(f, "candidate"),
            Winner::Current => write!(f, "current"),
            Winner::Neither => write!(f, "neither"),
        }
    }
}

/// Reads a fix file; `null` yields the NONE fix
pub fn read_fix(path: &Path) -> Result<LocationFix> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let raw: Option<RawLocation> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a location reading", path.display()))?;

    match raw {
        Some(raw) => LocationFix::from_raw(Some(raw))
            .with_context(|| format!("{} holds an invalid reading", path.display())),
        None => Ok(LocationFix::none()),
    }
}

/// Runs the comparator and reports which input it kept
///
/// Identical inputs count as keeping the current fix.
pub fn judge(
    candidate: &LocationFix,
    current: &LocationFix,
    thresholds: &ComparatorThresholds,
) -> (Winner, LocationFix) {
    let best = select_better(candidate, current, thresholds);
    let winner = if best.is_none() {
        Winner::Neither
    } else if best == *current {
        Winner::Current
    } else {
        Winner::Candidate
    };
    (winner, best)
}

/// Compare two fixes with the configured thresholds
pub fn run(config: &Config, candidate: &Path, current: &Path) -> Result<()> {
    let candidate_fix = read_fix(candidate)?;
    let current_fix = read_fix(current)?;
    let thresholds = config.comparator();

    let (winner, best) = judge(&candidate_fix, &current_fix, &thresholds);

    println!("Candidate: {}", candidate_fix);
    println!("Current:   {}", current_fix);
    println!();
    println!("Winner: {}", winner);
    if !best.is_none() {
        println!("  {}", best);
        println!(
            "  E6: {}, {}",
            best.latitude_e6(),
            best.longitude_e6()
        );
    }

    Ok(())
}
