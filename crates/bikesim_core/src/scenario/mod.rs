//! Scenario setup: stations, initial bikes, entry points and the shared
//! resources a run needs.
//!
//! The core consumes configuration as already-parsed values
//! ([`SimulationParams`]); file loading and schema validation are external.

mod build;
mod params;

pub use build::build_scenario;
pub use params::{
    ConfigError, EntryPoint, ReservationValiditySecs, SimulationBounds, SimulationParams,
    StationConfig, TimeRange, DEFAULT_RESERVATION_VALIDITY_SECS, DEFAULT_TOTAL_TIME_SECS,
};
