//! Object (row) encoding.
//!
//! An object is a flat list of typed fields:
//!
//! ```text
//! [size: u24]         // total encoded length, including this header
//! [field_count: u16]
//! field_count times:
//!   [field_id: u16]
//!   [type_tag: u8]
//!   [value]           // fixed width, or length prefixed for blobs
//! ```
//!
//! [`Object`] owns a reusable buffer and is the write side. [`ObjectView`]
//! borrows an encoded object out of a batch or page and is the read side.

use crate::buffer::{LeReader, LeWriter, MAX_UINT24};
use crate::error::{Error, Result};
use crate::types::{DataType, Value};

/// Length of the object header (size + field count).
pub const OBJECT_HEADER_LEN: usize = 5;

/// Length of the per-field header (id + type tag).
pub const FIELD_HEADER_LEN: usize = 3;

/// Reusable buffer holding one object under construction.
#[derive(Debug, Clone)]
pub struct Object {
    buf: Vec<u8>,
    size: usize,
    field_count: u16,
}

impl Object {
    /// Create an empty object able to grow to `max_size` encoded bytes.
    /// The size is clamped into `[OBJECT_HEADER_LEN, 2^24 - 1]`.
    pub fn with_capacity(max_size: usize) -> Self {
        let mut obj = Self {
            buf: vec![0u8; max_size.clamp(OBJECT_HEADER_LEN, MAX_UINT24)],
            size: OBJECT_HEADER_LEN,
            field_count: 0,
        };
        obj.reset();
        obj
    }

    /// Drop all fields. Must be called before encoding into a reused object.
    pub fn reset(&mut self) {
        self.size = OBJECT_HEADER_LEN;
        self.field_count = 0;
        self.store_header();
    }

    fn store_header(&mut self) {
        let [a, b, c, _] = (self.size as u32).to_le_bytes();
        let [d, e] = self.field_count.to_le_bytes();
        self.buf[..OBJECT_HEADER_LEN].copy_from_slice(&[a, b, c, d, e]);
    }

    /// Encoded size in bytes, including the header.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of fields added since the last reset.
    pub fn field_count(&self) -> u16 {
        self.field_count
    }

    /// Maximum encoded size.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// True if no field has been added.
    pub fn is_empty(&self) -> bool {
        self.field_count == 0
    }

    /// The encoded object.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.size]
    }

    /// Read-only view of the encoded object.
    pub fn view(&self) -> ObjectView<'_> {
        ObjectView { data: self.as_bytes(), field_count: self.field_count }
    }

    /// Append a field.
    ///
    /// Field ids are not checked for uniqueness; a repeated id simply shows
    /// up twice when iterating. If the field does not fit the object is left
    /// exactly as it was.
    pub fn add_field(&mut self, id: u16, value: Value<'_>) -> Result<()> {
        if self.field_count == u16::MAX {
            return Err(Error::capacity(format!("object already holds {} fields", u16::MAX)));
        }
        let needed = FIELD_HEADER_LEN + value.encoded_len();
        if self.size + needed > self.buf.len() {
            return Err(Error::capacity(format!(
                "field {} needs {} bytes but object has {} of {} bytes in use",
                id,
                needed,
                self.size,
                self.buf.len()
            )));
        }

        let mut w = LeWriter::at(&mut self.buf, self.size);
        w.write_u16(id)?;
        w.write_u8(value.data_type() as u8)?;
        value.write(&mut w)?;
        let end = w.position();

        self.size = end;
        self.field_count += 1;
        self.store_header();
        Ok(())
    }

    /// Append a 1 byte unsigned integer.
    pub fn add_u8(&mut self, id: u16, v: u8) -> Result<()> {
        self.add_field(id, Value::U8(v))
    }

    /// Append a 2 byte unsigned integer.
    pub fn add_u16(&mut self, id: u16, v: u16) -> Result<()> {
        self.add_field(id, Value::U16(v))
    }

    /// Append a 3 byte unsigned integer; values above 2^24 - 1 are rejected.
    pub fn add_u24(&mut self, id: u16, v: u32) -> Result<()> {
        self.add_field(id, Value::U24(v))
    }

    /// Append a 4 byte unsigned integer.
    pub fn add_u32(&mut self, id: u16, v: u32) -> Result<()> {
        self.add_field(id, Value::U32(v))
    }

    /// Append an 8 byte unsigned integer.
    pub fn add_u64(&mut self, id: u16, v: u64) -> Result<()> {
        self.add_field(id, Value::U64(v))
    }

    /// Append an i8, stored as U8.
    pub fn add_i8(&mut self, id: u16, v: i8) -> Result<()> {
        self.add_field(id, Value::U8(v as u8))
    }

    /// Append an i16, stored as U16.
    pub fn add_i16(&mut self, id: u16, v: i16) -> Result<()> {
        self.add_field(id, Value::U16(v as u16))
    }

    /// Append an i32, stored as U32.
    pub fn add_i32(&mut self, id: u16, v: i32) -> Result<()> {
        self.add_field(id, Value::U32(v as u32))
    }

    /// Append an i64, stored as U64.
    pub fn add_i64(&mut self, id: u16, v: i64) -> Result<()> {
        self.add_field(id, Value::U64(v as u64))
    }

    /// Append a single precision float.
    pub fn add_f32(&mut self, id: u16, v: f32) -> Result<()> {
        self.add_field(id, Value::F32(v))
    }

    /// Append a double precision float.
    pub fn add_f64(&mut self, id: u16, v: f64) -> Result<()> {
        self.add_field(id, Value::F64(v))
    }

    /// Append a blob using the smallest length prefix that fits.
    pub fn add_bytes(&mut self, id: u16, v: &[u8]) -> Result<()> {
        self.add_field(id, Value::bytes(v)?)
    }

    /// Append a UTF-8 string as a blob.
    pub fn add_str(&mut self, id: u16, v: &str) -> Result<()> {
        self.add_bytes(id, v.as_bytes())
    }
}

fn out_of_bounds_as_corruption(err: Error, what: &str) -> Error {
    match err {
        Error::OutOfBounds { .. } => Error::corruption(format!("{}: {}", what, err)),
        other => other,
    }
}

/// A borrowed, encoded object.
///
/// The view is sliced to exactly the declared object size, so no field can
/// be read from beyond the object.
#[derive(Debug, Clone, Copy)]
pub struct ObjectView<'a> {
    data: &'a [u8],
    field_count: u16,
}

impl<'a> ObjectView<'a> {
    /// Parse the object starting at `data[0]`. `data` may extend past the
    /// object; the view only covers the declared size.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        let mut r = LeReader::new(data);
        let size = r.read_u24().map_err(|e| out_of_bounds_as_corruption(e, "object header"))?
            as usize;
        let field_count =
            r.read_u16().map_err(|e| out_of_bounds_as_corruption(e, "object header"))?;

        if size < OBJECT_HEADER_LEN || size > data.len() {
            return Err(Error::corruption(format!(
                "object declares {} bytes but {} are available",
                size,
                data.len()
            )));
        }

        Ok(Self { data: &data[..size], field_count })
    }

    /// Encoded size in bytes, including the header.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Number of fields.
    pub fn field_count(&self) -> u16 {
        self.field_count
    }

    /// The encoded object.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Iterate the fields in insertion order.
    pub fn fields(&self) -> Fields<'a> {
        Fields {
            cursor: LeReader::at(self.data, OBJECT_HEADER_LEN),
            remaining: self.field_count,
            done: false,
        }
    }

    /// Call `visit` for each field in insertion order.
    ///
    /// Each [`Field`] carries its own cursor, so how much of the value the
    /// visitor reads has no effect on where the next field starts.
    pub fn for_each_field<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(Field<'a>) -> Result<()>,
    {
        for field in self.fields() {
            visit(field?)?;
        }
        Ok(())
    }

    /// First field with the given id.
    pub fn field(&self, id: u16) -> Result<Option<Field<'a>>> {
        for field in self.fields() {
            let field = field?;
            if field.id() == id {
                return Ok(Some(field));
            }
        }
        Ok(None)
    }
}

/// Iterator over the fields of an [`ObjectView`].
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    cursor: LeReader<'a>,
    remaining: u16,
    done: bool,
}

impl<'a> Fields<'a> {
    fn next_field(&mut self) -> Result<Field<'a>> {
        let id = self.cursor.read_u16()?;
        let kind = DataType::from_u8(self.cursor.read_u8()?)?;
        let start = self.cursor.position();
        self.cursor.skip_value(kind)?;
        let raw = &self.cursor.get_ref()[start..self.cursor.position()];
        Ok(Field { id, kind, raw })
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = Result<Field<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.remaining == 0 {
            self.done = true;
            let end = self.cursor.get_ref().len();
            if self.cursor.position() != end {
                return Some(Err(Error::corruption(format!(
                    "object fields end at {} but object size is {}",
                    self.cursor.position(),
                    end
                ))));
            }
            return None;
        }

        self.remaining -= 1;
        match self.next_field() {
            Ok(field) => Some(Ok(field)),
            Err(e) => {
                self.done = true;
                Some(Err(out_of_bounds_as_corruption(e, "object field")))
            }
        }
    }
}

/// One field of an encoded object.
#[derive(Debug, Clone, Copy)]
pub struct Field<'a> {
    id: u16,
    kind: DataType,
    raw: &'a [u8],
}

impl<'a> Field<'a> {
    /// Field id, an index into the header's name table.
    pub fn id(&self) -> u16 {
        self.id
    }

    /// Type tag of the value.
    pub fn kind(&self) -> DataType {
        self.kind
    }

    /// Encoded value bytes, including a blob's length prefix.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }

    /// A cursor positioned at the start of the value.
    pub fn reader(&self) -> LeReader<'a> {
        LeReader::new(self.raw)
    }

    /// Decode the value.
    pub fn value(&self) -> Result<Value<'a>> {
        Value::read(self.kind, &mut self.reader())
    }

    /// Integer value widened to u64.
    pub fn as_u64(&self) -> Option<u64> {
        self.value().ok()?.as_u64()
    }

    /// Integer value reinterpreted as a signed integer.
    pub fn as_i64(&self) -> Option<i64> {
        self.value().ok()?.as_i64()
    }

    /// Float value widened to f64.
    pub fn as_f64(&self) -> Option<f64> {
        self.value().ok()?.as_f64()
    }

    /// Blob payload.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        self.value().ok()?.as_bytes()
    }

    /// Blob payload as UTF-8.
    pub fn as_str(&self) -> Result<&'a str> {
        let bytes = self.as_bytes().ok_or_else(|| {
            Error::invalid_argument(format!(
                "field {} of type {:?} is not a blob",
                self.id, self.kind
            ))
        })?;
        std::str::from_utf8(bytes)
            .map_err(|e| Error::invalid_argument(format!("field {} is not UTF-8: {}", self.id, e)))
    }
}
