// Shared helpers for the LogDb integration tests.
// Rows are generated from an explicitly seeded rng so every test is repeatable.

#![allow(dead_code)]

use logdb::{DataType, Object, ObjectView, Options, Result, Value, DB};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// An owned copy of a decoded field value.
#[derive(Debug, Clone, PartialEq)]
pub enum OwnedValue {
    U8(u8),
    U16(u16),
    U24(u32),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Blob(DataType, Vec<u8>),
}

impl OwnedValue {
    pub fn from_value(value: Value<'_>) -> Self {
        match value {
            Value::U8(v) => OwnedValue::U8(v),
            Value::U16(v) => OwnedValue::U16(v),
            Value::U24(v) => OwnedValue::U24(v),
            Value::U32(v) => OwnedValue::U32(v),
            Value::U64(v) => OwnedValue::U64(v),
            Value::F32(v) => OwnedValue::F32(v),
            Value::F64(v) => OwnedValue::F64(v),
            Value::TinyBlob(b) | Value::Blob(b) | Value::MediumBlob(b) | Value::LongBlob(b) => {
                OwnedValue::Blob(value.data_type(), b.to_vec())
            }
        }
    }

    pub fn as_value(&self) -> Value<'_> {
        match self {
            OwnedValue::U8(v) => Value::U8(*v),
            OwnedValue::U16(v) => Value::U16(*v),
            OwnedValue::U24(v) => Value::U24(*v),
            OwnedValue::U32(v) => Value::U32(*v),
            OwnedValue::U64(v) => Value::U64(*v),
            OwnedValue::F32(v) => Value::F32(*v),
            OwnedValue::F64(v) => Value::F64(*v),
            OwnedValue::Blob(DataType::TinyBlob, b) => Value::TinyBlob(b),
            OwnedValue::Blob(DataType::Blob, b) => Value::Blob(b),
            OwnedValue::Blob(DataType::MediumBlob, b) => Value::MediumBlob(b),
            OwnedValue::Blob(_, b) => Value::LongBlob(b),
        }
    }
}

/// Field id and value pairs in insertion order.
pub type Row = Vec<(u16, OwnedValue)>;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Small sizes so a few hundred rows span many batches.
pub fn small_options() -> Options {
    Options::new().header_size(4096).max_object_size(1024).max_batch_size(16 * 1024)
}

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random_value(rng: &mut StdRng) -> OwnedValue {
    let blob_len = rng.random_range(0..64);
    let mut blob = vec![0u8; blob_len];
    rng.fill(&mut blob[..]);

    match rng.random_range(0..11) {
        0 => OwnedValue::U8(rng.random()),
        1 => OwnedValue::U16(rng.random()),
        2 => OwnedValue::U24(rng.random_range(0..1 << 24)),
        3 => OwnedValue::U32(rng.random()),
        4 => OwnedValue::U64(rng.random()),
        5 => OwnedValue::F32(rng.random()),
        6 => OwnedValue::F64(rng.random()),
        7 => OwnedValue::Blob(DataType::TinyBlob, blob),
        8 => OwnedValue::Blob(DataType::Blob, blob),
        9 => OwnedValue::Blob(DataType::MediumBlob, blob),
        _ => OwnedValue::Blob(DataType::LongBlob, blob),
    }
}

/// A row of up to 8 fields with ids below `names`.
pub fn random_row(rng: &mut StdRng, names: u16) -> Row {
    let fields = rng.random_range(0..=8);
    (0..fields).map(|_| (rng.random_range(0..names), random_value(rng))).collect()
}

pub fn random_rows(seed: u64, count: usize, names: u16) -> Vec<Row> {
    let mut rng = rng(seed);
    (0..count).map(|_| random_row(&mut rng, names)).collect()
}

pub fn encode_row(obj: &mut Object, row: &Row) -> Result<()> {
    for (id, value) in row {
        obj.add_field(*id, value.as_value())?;
    }
    Ok(())
}

pub fn decode_row(obj: &ObjectView<'_>) -> Result<Row> {
    let mut row = Vec::with_capacity(obj.field_count() as usize);
    obj.for_each_field(|field| {
        row.push((field.id(), OwnedValue::from_value(field.value()?)));
        Ok(())
    })?;
    Ok(row)
}

/// Registers `names` field names and appends all rows.
pub fn write_rows(db: &mut DB, rows: &[Row], names: u16) -> Result<()> {
    for i in 0..names {
        db.put_name(&format!("field_{}", i))?;
    }
    for row in rows {
        db.add(|obj| encode_row(obj, row))?;
    }
    Ok(())
}

/// Sequential scan into `(offset, row)` pairs.
pub fn scan_rows(db: &DB) -> Result<Vec<(u64, Row)>> {
    let mut rows = Vec::new();
    db.for_each(|id, obj| {
        rows.push((id, decode_row(&obj)?));
        Ok(())
    })?;
    Ok(rows)
}
