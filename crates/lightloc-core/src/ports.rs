//! Port definitions for Hexagonal Architecture
//!
//! These traits define the boundaries between the core domain and the
//! platform adapters.

pub mod location;

pub use location::{
    Criteria, CriteriaAccuracy, LocationPort, PlatformEvent, PortError, RawLocation,
    SubscriptionId, UpdateRequest, GPS_PROVIDER, NETWORK_PROVIDER,
};
