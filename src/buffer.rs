//! Little-endian cursors over byte slices.
//!
//! [`LeReader`] and [`LeWriter`] carry an explicit position and check every
//! access against the end of the slice. Nothing in here panics on malformed
//! input; an access past the end returns [`Error::OutOfBounds`] and leaves
//! the position untouched.

use crate::error::{Error, Result};
use crate::types::DataType;

/// 255
pub const MAX_UINT8: usize = (1 << 8) - 1;
/// 65535
pub const MAX_UINT16: usize = (1 << 16) - 1;
/// 16777215
pub const MAX_UINT24: usize = (1 << 24) - 1;
/// 4294967295
pub const MAX_UINT32: usize = u32::MAX as usize;

#[inline]
fn span(pos: usize, len: usize, capacity: usize) -> Result<usize> {
    match pos.checked_add(len) {
        Some(end) if end <= capacity => Ok(end),
        _ => Err(Error::OutOfBounds { pos, len, capacity }),
    }
}

/// Read cursor over a borrowed byte slice.
#[derive(Debug, Clone, Copy)]
pub struct LeReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> LeReader<'a> {
    /// Create a reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Create a reader positioned at `pos`.
    pub fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor. Bounds are checked on the next access.
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Bytes left between the cursor and the end of the slice.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// The whole underlying slice.
    pub fn get_ref(&self) -> &'a [u8] {
        self.buf
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = span(self.pos, len, self.buf.len())?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Advance the cursor by `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.take(len).map(|_| ())
    }

    /// Read one byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take_array::<1>()?[0])
    }

    /// Read a u16.
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take_array()?))
    }

    /// Read a 3 byte unsigned integer.
    pub fn read_u24(&mut self) -> Result<u32> {
        let b: [u8; 3] = self.take_array()?;
        Ok(u32::from(b[0]) | u32::from(b[1]) << 8 | u32::from(b[2]) << 16)
    }

    /// Read a u32.
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take_array()?))
    }

    /// Read a u64.
    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take_array()?))
    }

    /// Read an IEEE 754 single precision float.
    pub fn read_f32(&mut self) -> Result<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Read an IEEE 754 double precision float.
    pub fn read_f64(&mut self) -> Result<f64> {
        self.read_u64().map(f64::from_bits)
    }

    /// Read the 3 byte value at the cursor without moving it.
    pub fn peek_u24(&self) -> Result<u32> {
        let mut copy = *self;
        copy.read_u24()
    }

    /// Read the u32 at the cursor without moving it.
    pub fn peek_u32(&self) -> Result<u32> {
        let mut copy = *self;
        copy.read_u32()
    }

    /// Borrow the next `len` bytes.
    pub fn read_slice(&mut self, len: usize) -> Result<&'a [u8]> {
        self.take(len)
    }

    /// Fill `dst` completely.
    pub fn read_into(&mut self, dst: &mut [u8]) -> Result<()> {
        dst.copy_from_slice(self.take(dst.len())?);
        Ok(())
    }

    /// Read a blob with a 1 byte length prefix.
    pub fn read_tiny_blob(&mut self) -> Result<&'a [u8]> {
        self.read_blob_of(DataType::TinyBlob)
    }

    /// Read a blob with a 2 byte length prefix.
    pub fn read_blob(&mut self) -> Result<&'a [u8]> {
        self.read_blob_of(DataType::Blob)
    }

    /// Read a blob with a 3 byte length prefix.
    pub fn read_medium_blob(&mut self) -> Result<&'a [u8]> {
        self.read_blob_of(DataType::MediumBlob)
    }

    /// Read a blob with a 4 byte length prefix.
    pub fn read_long_blob(&mut self) -> Result<&'a [u8]> {
        self.read_blob_of(DataType::LongBlob)
    }

    /// Read a blob whose prefix width is given by `kind`.
    pub fn read_blob_of(&mut self, kind: DataType) -> Result<&'a [u8]> {
        let start = self.pos;
        let result = self.read_blob_len(kind).and_then(|len| self.take(len));
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    fn read_blob_len(&mut self, kind: DataType) -> Result<usize> {
        let len = match kind {
            DataType::TinyBlob => usize::from(self.read_u8()?),
            DataType::Blob => usize::from(self.read_u16()?),
            DataType::MediumBlob => self.read_u24()? as usize,
            DataType::LongBlob => self.read_u32()? as usize,
            other => {
                return Err(Error::invalid_argument(format!("{:?} is not a blob type", other)))
            }
        };
        Ok(len)
    }

    /// Move the cursor past one encoded value of type `kind` without decoding
    /// it and return the number of bytes skipped.
    pub fn skip_value(&mut self, kind: DataType) -> Result<usize> {
        let start = self.pos;
        let result = match kind.fixed_width() {
            Some(width) => self.skip(width),
            None => self.read_blob_of(kind).map(|_| ()),
        };
        match result {
            Ok(()) => Ok(self.pos - start),
            Err(e) => {
                self.pos = start;
                Err(e)
            }
        }
    }
}

/// Write cursor over a borrowed, fixed-size byte slice.
#[derive(Debug)]
pub struct LeWriter<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> LeWriter<'a> {
    /// Create a writer positioned at the start of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Create a writer positioned at `pos`.
    pub fn at(buf: &'a mut [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    /// Current cursor position.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor. Bounds are checked on the next access.
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Bytes left between the cursor and the end of the slice.
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn reserve(&mut self, len: usize) -> Result<&mut [u8]> {
        let end = span(self.pos, len, self.buf.len())?;
        let start = self.pos;
        self.pos = end;
        Ok(&mut self.buf[start..end])
    }

    /// Write one byte.
    pub fn write_u8(&mut self, v: u8) -> Result<()> {
        self.reserve(1)?[0] = v;
        Ok(())
    }

    /// Write a u16.
    pub fn write_u16(&mut self, v: u16) -> Result<()> {
        self.write_slice(&v.to_le_bytes())
    }

    /// Write the low 3 bytes of `v`. Values above 2^24 - 1 are rejected.
    pub fn write_u24(&mut self, v: u32) -> Result<()> {
        if v as usize > MAX_UINT24 {
            return Err(Error::invalid_argument(format!("{} does not fit into 24 bits", v)));
        }
        self.write_slice(&v.to_le_bytes()[..3])
    }

    /// Write a u32.
    pub fn write_u32(&mut self, v: u32) -> Result<()> {
        self.write_slice(&v.to_le_bytes())
    }

    /// Write a u64.
    pub fn write_u64(&mut self, v: u64) -> Result<()> {
        self.write_slice(&v.to_le_bytes())
    }

    /// Write an IEEE 754 single precision float.
    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.write_u32(v.to_bits())
    }

    /// Write an IEEE 754 double precision float.
    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.write_u64(v.to_bits())
    }

    /// Copy `v` to the cursor.
    pub fn write_slice(&mut self, v: &[u8]) -> Result<()> {
        self.reserve(v.len())?.copy_from_slice(v);
        Ok(())
    }

    /// Write a blob with a 1 byte length prefix.
    pub fn write_tiny_blob(&mut self, v: &[u8]) -> Result<()> {
        self.write_blob_of(DataType::TinyBlob, v)
    }

    /// Write a blob with a 2 byte length prefix.
    pub fn write_blob(&mut self, v: &[u8]) -> Result<()> {
        self.write_blob_of(DataType::Blob, v)
    }

    /// Write a blob with a 3 byte length prefix.
    pub fn write_medium_blob(&mut self, v: &[u8]) -> Result<()> {
        self.write_blob_of(DataType::MediumBlob, v)
    }

    /// Write a blob with a 4 byte length prefix.
    pub fn write_long_blob(&mut self, v: &[u8]) -> Result<()> {
        self.write_blob_of(DataType::LongBlob, v)
    }

    /// Write a blob whose prefix width is given by `kind`. Blobs longer than
    /// the prefix can express are rejected instead of truncated.
    pub fn write_blob_of(&mut self, kind: DataType, v: &[u8]) -> Result<()> {
        let max = kind
            .max_blob_len()
            .ok_or_else(|| Error::invalid_argument(format!("{:?} is not a blob type", kind)))?;
        if v.len() > max {
            return Err(Error::invalid_argument(format!(
                "blob of {} bytes exceeds {:?} limit of {}",
                v.len(),
                kind,
                max
            )));
        }
        let prefix = kind.blob_prefix_len().unwrap_or(0);
        span(self.pos, prefix + v.len(), self.buf.len())?;
        match kind {
            DataType::TinyBlob => self.write_u8(v.len() as u8)?,
            DataType::Blob => self.write_u16(v.len() as u16)?,
            DataType::MediumBlob => self.write_u24(v.len() as u32)?,
            _ => self.write_u32(v.len() as u32)?,
        }
        self.write_slice(v)
    }
}
