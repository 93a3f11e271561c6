use std::error::Error;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;

use crate::ecs::UserState;
use crate::reservations::{ReservationKind, ReservationState};

pub(super) fn u64_field(name: &'static str) -> Field {
    Field::new(name, DataType::UInt64, false)
}

pub(super) fn nullable_u64_field(name: &'static str) -> Field {
    Field::new(name, DataType::UInt64, true)
}

pub(super) fn u8_field(name: &'static str) -> Field {
    Field::new(name, DataType::UInt8, false)
}

pub(super) fn str_field(name: &'static str) -> Field {
    Field::new(name, DataType::Utf8, false)
}

pub(super) fn write_record_batch<P: AsRef<Path>>(
    path: P,
    schema: Schema,
    arrays: Vec<ArrayRef>,
) -> Result<(), Box<dyn Error>> {
    let schema = Arc::new(schema);
    let batch = RecordBatch::try_new(schema.clone(), arrays)?;
    let file = File::create(path)?;
    let mut writer = ArrowWriter::try_new(file, schema, None)?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

pub(super) fn user_state_code(state: UserState) -> u8 {
    match state {
        UserState::Pending => 0,
        UserState::Walking => 1,
        UserState::Cycling => 2,
        UserState::LeftSystem => 3,
    }
}

pub(super) fn reservation_kind_code(kind: ReservationKind) -> u8 {
    match kind {
        ReservationKind::Bike => 0,
        ReservationKind::Slot => 1,
    }
}

pub(super) fn reservation_state_code(state: ReservationState) -> u8 {
    match state {
        ReservationState::Active => 0,
        ReservationState::Failed => 1,
        ReservationState::Expired => 2,
        ReservationState::Successful => 3,
    }
}
