use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, UInt64Array, UInt8Array};
use arrow::datatypes::{DataType, Field, Schema};

use crate::history::SimHistory;

use super::utils::{u64_field, u8_field, user_state_code, write_record_batch};

/// Export the initial user snapshots.
pub fn write_users_parquet<P: AsRef<Path>>(
    path: P,
    history: &SimHistory,
) -> Result<(), Box<dyn Error>> {
    let users = &history.initial_users;
    let mut entities = Vec::with_capacity(users.len());
    let mut lats = Vec::with_capacity(users.len());
    let mut lngs = Vec::with_capacity(users.len());
    let mut states = Vec::with_capacity(users.len());
    let mut has_bike = Vec::with_capacity(users.len());

    for user in users {
        entities.push(user.entity.to_bits());
        lats.push(user.lat);
        lngs.push(user.lng);
        states.push(user_state_code(user.state));
        has_bike.push(user.has_bike);
    }

    let schema = Schema::new(vec![
        u64_field("entity"),
        Field::new("lat", DataType::Float64, false),
        Field::new("lng", DataType::Float64, false),
        u8_field("state"),
        Field::new("has_bike", DataType::Boolean, false),
    ]);

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(entities)),
        Arc::new(Float64Array::from(lats)),
        Arc::new(Float64Array::from(lngs)),
        Arc::new(UInt8Array::from(states)),
        Arc::new(BooleanArray::from(has_bike)),
    ];

    write_record_batch(path, schema, arrays)
}
