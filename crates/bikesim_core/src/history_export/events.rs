use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, StringArray, UInt64Array};
use arrow::datatypes::Schema;

use crate::history::SimHistory;

use super::utils::{nullable_u64_field, str_field, u64_field, write_record_batch};

/// Export the executed-event log: scheduling key, kind tag and the number of
/// entities the event touched.
pub fn write_events_parquet<P: AsRef<Path>>(
    path: P,
    history: &SimHistory,
) -> Result<(), Box<dyn Error>> {
    let entries = history.entries();
    let mut instants = Vec::with_capacity(entries.len());
    let mut seqs = Vec::with_capacity(entries.len());
    let mut kinds = Vec::with_capacity(entries.len());
    let mut touched_counts = Vec::with_capacity(entries.len());

    for entry in entries {
        instants.push(entry.instant);
        seqs.push(entry.seq);
        kinds.push(entry.kind.tag());
        touched_counts.push(Some(entry.touched.len() as u64));
    }

    let schema = Schema::new(vec![
        u64_field("instant"),
        u64_field("seq"),
        str_field("kind"),
        nullable_u64_field("touched_entities"),
    ]);

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(instants)),
        Arc::new(UInt64Array::from(seqs)),
        Arc::new(StringArray::from(kinds)),
        Arc::new(UInt64Array::from_iter(touched_counts)),
    ];

    write_record_batch(path, schema, arrays)
}
