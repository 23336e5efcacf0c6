//! LightLoc Adapters - Infrastructure implementations
//!
//! Concrete implementations of the ports defined in lightloc-core. The
//! simulated location service stands in for a device location manager;
//! the replay module drives it from recorded traces.

pub mod replay;
pub mod simulated;

// Re-export primary adapter types
pub use replay::{parse_trace, ReplayError, ReplaySummary, TraceEntry, TraceEvent, TraceReplayer};
pub use simulated::{Operation, SimulatedLocationService, SimulationError};

#[cfg(test)]
mod tests {
    use lightloc_core::config::Config;

    #[test]
    fn test_can_access_core_types() {
        let config = Config::default();
        assert_eq!(config.tracking.session_timeout_secs, 60);
    }
}
