use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, UInt64Array};
use arrow::datatypes::Schema;

use crate::history::SimHistory;

use super::utils::{u64_field, write_record_batch};

/// Export the initial station snapshots.
pub fn write_stations_parquet<P: AsRef<Path>>(
    path: P,
    history: &SimHistory,
) -> Result<(), Box<dyn Error>> {
    let stations = &history.initial_stations;
    let mut entities = Vec::with_capacity(stations.len());
    let mut capacities = Vec::with_capacity(stations.len());
    let mut docked = Vec::with_capacity(stations.len());
    let mut reserved_bikes = Vec::with_capacity(stations.len());
    let mut reserved_slots = Vec::with_capacity(stations.len());

    for station in stations {
        entities.push(station.entity.to_bits());
        capacities.push(station.capacity as u64);
        docked.push(station.docked as u64);
        reserved_bikes.push(station.reserved_bikes as u64);
        reserved_slots.push(station.reserved_slots as u64);
    }

    let schema = Schema::new(vec![
        u64_field("entity"),
        u64_field("capacity"),
        u64_field("docked"),
        u64_field("reserved_bikes"),
        u64_field("reserved_slots"),
    ]);

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(entities)),
        Arc::new(UInt64Array::from(capacities)),
        Arc::new(UInt64Array::from(docked)),
        Arc::new(UInt64Array::from(reserved_bikes)),
        Arc::new(UInt64Array::from(reserved_slots)),
    ];

    write_record_batch(path, schema, arrays)
}
