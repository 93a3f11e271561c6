//! Parquet export of the history sink: one writer per output table.
//!
//! The exported files are consumed by external analysis tooling; the core
//! never reads them back.

mod events;
mod reservations;
mod stations;
mod users;
mod utils;

pub use events::write_events_parquet;
pub use reservations::write_reservations_parquet;
pub use stations::write_stations_parquet;
pub use users::write_users_parquet;
