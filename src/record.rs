//! Record (batch) encoding.
//!
//! A record is the unit of I/O: many encoded objects stored back to back
//! behind a small header.
//!
//! ```text
//! [size: u32]          // total length including this header
//! [object_count: u32]
//! object_count times:
//!   [object]           // self-delimiting, see `object`
//! ```
//!
//! Every object starts with its own 3 byte length, so a reader can step from
//! one object to the next without decoding any field.

use crate::buffer::{LeReader, MAX_UINT32};
use crate::error::{Error, Result};
use crate::object::{Object, ObjectView, OBJECT_HEADER_LEN};

/// Length of the record header (size + object count).
pub const RECORD_HEADER_LEN: usize = 8;

/// Reusable buffer accumulating objects for one batch.
#[derive(Debug, Clone)]
pub struct Record {
    buf: Vec<u8>,
    size: usize,
    count: u32,
}

impl Record {
    /// Create an empty record able to grow to `max_size` bytes.
    pub fn with_capacity(max_size: usize) -> Self {
        let mut record = Self {
            buf: vec![0u8; max_size.clamp(RECORD_HEADER_LEN, MAX_UINT32)],
            size: RECORD_HEADER_LEN,
            count: 0,
        };
        record.reset();
        record
    }

    /// Drop all objects.
    pub fn reset(&mut self) {
        self.size = RECORD_HEADER_LEN;
        self.count = 0;
        self.store_header();
    }

    fn store_header(&mut self) {
        self.buf[0..4].copy_from_slice(&(self.size as u32).to_le_bytes());
        self.buf[4..8].copy_from_slice(&self.count.to_le_bytes());
    }

    /// Encoded size including the header.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of objects in the record.
    pub fn object_count(&self) -> u32 {
        self.count
    }

    /// Maximum encoded size.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Free bytes left in the record.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.size
    }

    /// True if no object has been added.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The encoded record.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.size]
    }

    /// Read-only view of the encoded record.
    pub fn view(&self) -> RecordView<'_> {
        RecordView { data: self.as_bytes(), count: self.count }
    }

    /// Copy `obj` to the end of the record.
    ///
    /// Returns a capacity error and leaves the record untouched if the object
    /// does not fit; callers are expected to flush before that happens.
    pub fn push(&mut self, obj: &Object) -> Result<()> {
        let bytes = obj.as_bytes();
        if bytes.len() > self.remaining() {
            return Err(Error::capacity(format!(
                "object of {} bytes does not fit into record with {} of {} bytes free",
                bytes.len(),
                self.remaining(),
                self.buf.len()
            )));
        }
        if self.count == u32::MAX {
            return Err(Error::capacity("record object count overflows u32"));
        }

        self.buf[self.size..self.size + bytes.len()].copy_from_slice(bytes);
        self.size += bytes.len();
        self.count += 1;
        self.store_header();
        Ok(())
    }
}

/// A borrowed, encoded record.
#[derive(Debug, Clone, Copy)]
pub struct RecordView<'a> {
    data: &'a [u8],
    count: u32,
}

impl<'a> RecordView<'a> {
    /// Parse the record starting at `data[0]`. `data` may extend past the
    /// record; the view only covers the declared size.
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < RECORD_HEADER_LEN {
            return Err(Error::corruption(format!(
                "record header truncated: {} of {} bytes",
                data.len(),
                RECORD_HEADER_LEN
            )));
        }

        let mut r = LeReader::new(data);
        let size = r.read_u32()? as usize;
        let count = r.read_u32()?;
        if size < RECORD_HEADER_LEN || size > data.len() {
            return Err(Error::corruption(format!(
                "record declares {} bytes but {} are available",
                size,
                data.len()
            )));
        }

        Ok(Self { data: &data[..size], count })
    }

    /// Declared size of a record whose first bytes are `prefix`.
    pub fn peek_size(prefix: &[u8]) -> Result<usize> {
        let size = LeReader::new(prefix).read_u32().map_err(|_| {
            Error::corruption(format!("record header truncated: {} bytes", prefix.len()))
        })? as usize;
        if size < RECORD_HEADER_LEN {
            return Err(Error::corruption(format!("record declares only {} bytes", size)));
        }
        Ok(size)
    }

    /// Encoded size including the header.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Number of objects.
    pub fn object_count(&self) -> u32 {
        self.count
    }

    /// The encoded record.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }

    fn walk<F>(&self, mut step: F) -> Result<()>
    where
        F: FnMut(usize, &'a [u8]) -> Result<()>,
    {
        let mut r = LeReader::at(self.data, RECORD_HEADER_LEN);
        for i in 0..self.count {
            let pos = r.position();
            let size = r.peek_u24().map_err(|_| {
                Error::corruption(format!("object {} of {} truncated at {}", i, self.count, pos))
            })? as usize;
            if size < OBJECT_HEADER_LEN {
                return Err(Error::corruption(format!(
                    "object {} at {} declares only {} bytes",
                    i, pos, size
                )));
            }
            let obj = r.read_slice(size).map_err(|_| {
                Error::corruption(format!(
                    "object {} at {} with {} bytes runs past record of {} bytes",
                    i,
                    pos,
                    size,
                    self.data.len()
                ))
            })?;
            step(pos, obj)?;
        }

        if r.position() != self.data.len() {
            return Err(Error::corruption(format!(
                "record objects end at {} but record size is {}",
                r.position(),
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Call `visit` with the absolute offset and view of every object.
    /// `base` is the file offset of the record itself.
    pub fn for_each<F>(&self, base: u64, mut visit: F) -> Result<()>
    where
        F: FnMut(u64, ObjectView<'a>) -> Result<()>,
    {
        self.walk(|pos, bytes| visit(base + pos as u64, ObjectView::parse(bytes)?))
    }

    /// Append the absolute offset of every object to `dst` without looking
    /// at any field.
    pub fn obj_offsets(&self, base: u64, dst: &mut Vec<u64>) -> Result<()> {
        // the count is untrusted until the walk succeeds
        dst.reserve((self.count as usize).min(self.data.len() / OBJECT_HEADER_LEN));
        self.walk(|pos, _| {
            dst.push(base + pos as u64);
            Ok(())
        })
    }
}
