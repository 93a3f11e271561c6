use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, UInt64Array, UInt8Array};
use arrow::datatypes::Schema;

use crate::reservations::Reservations;

use super::utils::{
    nullable_u64_field, reservation_kind_code, reservation_state_code, u64_field, u8_field,
    write_record_batch,
};

/// Export the full reservation ledger.
pub fn write_reservations_parquet<P: AsRef<Path>>(
    path: P,
    reservations: &Reservations,
) -> Result<(), Box<dyn Error>> {
    let records = reservations.all();
    let mut ids = Vec::with_capacity(records.len());
    let mut kinds = Vec::with_capacity(records.len());
    let mut states = Vec::with_capacity(records.len());
    let mut starts = Vec::with_capacity(records.len());
    let mut ends = Vec::with_capacity(records.len());
    let mut users = Vec::with_capacity(records.len());
    let mut stations = Vec::with_capacity(records.len());

    for record in records {
        ids.push(record.id.index() as u64);
        kinds.push(reservation_kind_code(record.kind));
        states.push(reservation_state_code(record.state));
        starts.push(record.start_instant);
        ends.push(record.end_instant);
        users.push(record.user.to_bits());
        stations.push(record.station.to_bits());
    }

    let schema = Schema::new(vec![
        u64_field("id"),
        u8_field("kind"),
        u8_field("state"),
        u64_field("start_instant"),
        nullable_u64_field("end_instant"),
        u64_field("user"),
        u64_field("station"),
    ]);

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(ids)),
        Arc::new(UInt8Array::from(kinds)),
        Arc::new(UInt8Array::from(states)),
        Arc::new(UInt64Array::from(starts)),
        Arc::new(UInt64Array::from_iter(ends)),
        Arc::new(UInt64Array::from(users)),
        Arc::new(UInt64Array::from(stations)),
    ];

    write_record_batch(path, schema, arrays)
}
