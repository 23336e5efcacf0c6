//! Freshness versus accuracy arbitration between two fixes
//!
//! `select_better` is a pairwise heuristic, not a sort key: folding it over a
//! stream of fixes can give a different winner depending on arrival order.

use crate::fix::LocationFix;

/// Default window beyond which a time difference alone decides (15 minutes)
pub const DEFAULT_SIGNIFICANT_TIME_MS: i64 = 15 * 60 * 1000;

/// Default accuracy loss still tolerated from a newer same-provider fix
pub const DEFAULT_SIGNIFICANT_ACCURACY_METERS: f64 = 200.0;

/// Tunable thresholds of the comparison
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComparatorThresholds {
    /// A candidate newer (or older) than this is taken (or rejected) outright
    pub significant_time_ms: i64,
    /// Largest accuracy loss accepted from a newer fix of the same provider
    pub significant_accuracy_meters: f64,
}

impl Default for ComparatorThresholds {
    fn default() -> Self {
        Self {
            significant_time_ms: DEFAULT_SIGNIFICANT_TIME_MS,
            significant_accuracy_meters: DEFAULT_SIGNIFICANT_ACCURACY_METERS,
        }
    }
}

/// Pick the fix that should be treated as authoritative
///
/// `candidate` is the newly arrived fix, `current` the best one known so far.
/// The returned value is a clone of one of the two inputs.
pub fn select_better(
    candidate: &LocationFix,
    current: &LocationFix,
    thresholds: &ComparatorThresholds,
) -> LocationFix {
    if current.is_none() {
        return candidate.clone();
    }
    if candidate.is_none() {
        return current.clone();
    }

    // i128 so that timestamps at opposite ends of the i64 range still compare
    let time_delta = i128::from(candidate.timestamp_ms()) - i128::from(current.timestamp_ms());
    let window = i128::from(thresholds.significant_time_ms);
    if time_delta > window {
        return candidate.clone();
    }
    if time_delta < -window {
        return current.clone();
    }
    let is_newer = time_delta > 0;

    let accuracy_delta = accuracy_delta(candidate, current);
    let is_more_accurate = accuracy_delta < 0.0;
    let is_less_accurate = accuracy_delta > 0.0;
    let is_significantly_less_accurate = accuracy_delta > thresholds.significant_accuracy_meters;
    let is_same_provider = candidate.source() == current.source();

    if is_more_accurate {
        candidate.clone()
    } else if is_newer && !is_less_accurate {
        candidate.clone()
    } else if is_newer && !is_significantly_less_accurate && is_same_provider {
        candidate.clone()
    } else {
        current.clone()
    }
}

/// `select_better` with the stock 15 minute / 200 meter thresholds
pub fn select_better_with_defaults(candidate: &LocationFix, current: &LocationFix) -> LocationFix {
    select_better(candidate, current, &ComparatorThresholds::default())
}

// inf - inf is NaN; two unknown accuracies are equally bad
fn accuracy_delta(candidate: &LocationFix, current: &LocationFix) -> f64 {
    match (candidate.accuracy(), current.accuracy()) {
        (None, None) => 0.0,
        _ => candidate.accuracy_or_worst() - current.accuracy_or_worst(),
    }
}
