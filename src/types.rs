//! Field value types and their wire tags.

use crate::buffer::{LeReader, LeWriter, MAX_UINT16, MAX_UINT24, MAX_UINT32, MAX_UINT8};
use crate::error::{Error, Result};

/// Type tag stored in front of every field value.
///
/// Signed integers have no tag of their own; they are stored as the bit
/// pattern of the unsigned type of the same width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DataType {
    /// 1 byte unsigned integer
    U8 = 1,
    /// 2 byte unsigned integer
    U16 = 2,
    /// 3 byte unsigned integer
    U24 = 3,
    /// 4 byte unsigned integer
    U32 = 4,
    /// 8 byte unsigned integer
    U64 = 5,
    /// Blob of at most 255 bytes, 1 byte length prefix
    TinyBlob = 6,
    /// Blob of at most 65535 bytes, 2 byte length prefix
    Blob = 7,
    /// Blob of at most 16777215 bytes, 3 byte length prefix
    MediumBlob = 8,
    /// Blob of at most 4294967295 bytes, 4 byte length prefix
    LongBlob = 9,
    /// IEEE 754 single precision float
    F32 = 10,
    /// IEEE 754 double precision float
    F64 = 11,
}

impl DataType {
    /// Decode a type tag. Unknown tags mean the data is corrupt.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(DataType::U8),
            2 => Ok(DataType::U16),
            3 => Ok(DataType::U24),
            4 => Ok(DataType::U32),
            5 => Ok(DataType::U64),
            6 => Ok(DataType::TinyBlob),
            7 => Ok(DataType::Blob),
            8 => Ok(DataType::MediumBlob),
            9 => Ok(DataType::LongBlob),
            10 => Ok(DataType::F32),
            11 => Ok(DataType::F64),
            _ => Err(Error::Corruption(format!("Invalid field type tag: {}", value))),
        }
    }

    /// Encoded width of fixed-size values, `None` for blobs.
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            DataType::U8 => Some(1),
            DataType::U16 => Some(2),
            DataType::U24 => Some(3),
            DataType::U32 | DataType::F32 => Some(4),
            DataType::U64 | DataType::F64 => Some(8),
            _ => None,
        }
    }

    /// Width of the length prefix of blob types.
    pub fn blob_prefix_len(self) -> Option<usize> {
        match self {
            DataType::TinyBlob => Some(1),
            DataType::Blob => Some(2),
            DataType::MediumBlob => Some(3),
            DataType::LongBlob => Some(4),
            _ => None,
        }
    }

    /// Longest payload a blob type can carry.
    pub fn max_blob_len(self) -> Option<usize> {
        match self {
            DataType::TinyBlob => Some(MAX_UINT8),
            DataType::Blob => Some(MAX_UINT16),
            DataType::MediumBlob => Some(MAX_UINT24),
            DataType::LongBlob => Some(MAX_UINT32),
            _ => None,
        }
    }

    /// Smallest blob type able to carry `len` bytes.
    pub fn blob_for_len(len: usize) -> Result<Self> {
        if len <= MAX_UINT8 {
            Ok(DataType::TinyBlob)
        } else if len <= MAX_UINT16 {
            Ok(DataType::Blob)
        } else if len <= MAX_UINT24 {
            Ok(DataType::MediumBlob)
        } else if len <= MAX_UINT32 {
            Ok(DataType::LongBlob)
        } else {
            Err(Error::invalid_argument(format!("blob of {} bytes is too large", len)))
        }
    }

    /// True for the unsigned integer types.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            DataType::U8 | DataType::U16 | DataType::U24 | DataType::U32 | DataType::U64
        )
    }

    /// True for the float types.
    pub fn is_float(self) -> bool {
        matches!(self, DataType::F32 | DataType::F64)
    }

    /// True for the blob types.
    pub fn is_blob(self) -> bool {
        self.blob_prefix_len().is_some()
    }
}

/// A decoded field value. Blobs borrow from the buffer they were read from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// 1 byte unsigned integer
    U8(u8),
    /// 2 byte unsigned integer
    U16(u16),
    /// 3 byte unsigned integer, the top byte must be zero
    U24(u32),
    /// 4 byte unsigned integer
    U32(u32),
    /// 8 byte unsigned integer
    U64(u64),
    /// Single precision float
    F32(f32),
    /// Double precision float
    F64(f64),
    /// Blob with a 1 byte length prefix
    TinyBlob(&'a [u8]),
    /// Blob with a 2 byte length prefix
    Blob(&'a [u8]),
    /// Blob with a 3 byte length prefix
    MediumBlob(&'a [u8]),
    /// Blob with a 4 byte length prefix
    LongBlob(&'a [u8]),
}

impl<'a> Value<'a> {
    /// The tag this value is written with.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::U8(_) => DataType::U8,
            Value::U16(_) => DataType::U16,
            Value::U24(_) => DataType::U24,
            Value::U32(_) => DataType::U32,
            Value::U64(_) => DataType::U64,
            Value::F32(_) => DataType::F32,
            Value::F64(_) => DataType::F64,
            Value::TinyBlob(_) => DataType::TinyBlob,
            Value::Blob(_) => DataType::Blob,
            Value::MediumBlob(_) => DataType::MediumBlob,
            Value::LongBlob(_) => DataType::LongBlob,
        }
    }

    /// Blob value using the smallest prefix able to hold `bytes`.
    pub fn bytes(bytes: &'a [u8]) -> Result<Self> {
        Ok(match DataType::blob_for_len(bytes.len())? {
            DataType::TinyBlob => Value::TinyBlob(bytes),
            DataType::Blob => Value::Blob(bytes),
            DataType::MediumBlob => Value::MediumBlob(bytes),
            _ => Value::LongBlob(bytes),
        })
    }

    /// Number of bytes the value occupies on the wire, excluding the tag.
    pub fn encoded_len(&self) -> usize {
        let kind = self.data_type();
        match (kind.fixed_width(), self.as_bytes()) {
            (Some(width), _) => width,
            (None, Some(bytes)) => kind.blob_prefix_len().unwrap_or(0) + bytes.len(),
            (None, None) => 0,
        }
    }

    /// Integer values widened to u64.
    pub fn as_u64(&self) -> Option<u64> {
        match *self {
            Value::U8(v) => Some(u64::from(v)),
            Value::U16(v) => Some(u64::from(v)),
            Value::U24(v) | Value::U32(v) => Some(u64::from(v)),
            Value::U64(v) => Some(v),
            _ => None,
        }
    }

    /// Integer values reinterpreted as signed integers of their own width.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::U8(v) => Some(i64::from(v as i8)),
            Value::U16(v) => Some(i64::from(v as i16)),
            Value::U24(v) => Some(i64::from(((v << 8) as i32) >> 8)),
            Value::U32(v) => Some(i64::from(v as i32)),
            Value::U64(v) => Some(v as i64),
            _ => None,
        }
    }

    /// Float values widened to f64.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(f64::from(v)),
            Value::F64(v) => Some(v),
            _ => None,
        }
    }

    /// Blob payload.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        match *self {
            Value::TinyBlob(b) | Value::Blob(b) | Value::MediumBlob(b) | Value::LongBlob(b) => {
                Some(b)
            }
            _ => None,
        }
    }

    pub(crate) fn write(&self, w: &mut LeWriter<'_>) -> Result<()> {
        match *self {
            Value::U8(v) => w.write_u8(v),
            Value::U16(v) => w.write_u16(v),
            Value::U24(v) => w.write_u24(v),
            Value::U32(v) => w.write_u32(v),
            Value::U64(v) => w.write_u64(v),
            Value::F32(v) => w.write_f32(v),
            Value::F64(v) => w.write_f64(v),
            Value::TinyBlob(b) => w.write_tiny_blob(b),
            Value::Blob(b) => w.write_blob(b),
            Value::MediumBlob(b) => w.write_medium_blob(b),
            Value::LongBlob(b) => w.write_long_blob(b),
        }
    }

    pub(crate) fn read(kind: DataType, r: &mut LeReader<'a>) -> Result<Self> {
        Ok(match kind {
            DataType::U8 => Value::U8(r.read_u8()?),
            DataType::U16 => Value::U16(r.read_u16()?),
            DataType::U24 => Value::U24(r.read_u24()?),
            DataType::U32 => Value::U32(r.read_u32()?),
            DataType::U64 => Value::U64(r.read_u64()?),
            DataType::F32 => Value::F32(r.read_f32()?),
            DataType::F64 => Value::F64(r.read_f64()?),
            DataType::TinyBlob => Value::TinyBlob(r.read_tiny_blob()?),
            DataType::Blob => Value::Blob(r.read_blob()?),
            DataType::MediumBlob => Value::MediumBlob(r.read_medium_blob()?),
            DataType::LongBlob => Value::LongBlob(r.read_long_blob()?),
        })
    }
}
