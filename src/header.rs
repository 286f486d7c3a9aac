//! File header and name table.
//!
//! The header occupies a fixed, reserved region at offset 0 of every file:
//!
//! ```text
//! [magic: 8 bytes]          // "wdylogdb"
//! [version: u32]
//! [header_size: u32]        // reserved length of this region
//! [object_count: u64]
//! [tx_count: u64]
//! [name_count: u64]
//! name_count times:
//!   [type_tag: u8]          // smallest blob type that fits the name
//!   [length prefix]         // 1, 2, 3 or 4 bytes depending on the tag
//!   [utf-8 bytes]
//! [zero padding up to header_size]
//! ```

use crate::buffer::LeReader;
use crate::error::{Error, Result};
use crate::io;
use crate::types::DataType;
use bytes::{BufMut, BytesMut};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};

/// Magic bytes at the start of every file.
pub const MAGIC: [u8; 8] = *b"wdylogdb";

/// Supported format version.
pub const VERSION: u32 = 1;

/// Length of the header before the name list.
pub const FIXED_HEADER_LEN: usize = 8 + 4 + 4 + 8 + 8 + 8;

/// Ids are u16 on the wire.
const MAX_NAMES: usize = u16::MAX as usize + 1;

#[derive(Debug, Default)]
struct NameTable {
    names: Vec<String>,
    lookup: HashMap<String, u16>,
    /// Encoded length of the header including all names.
    used: usize,
}

impl NameTable {
    fn new() -> Self {
        Self { used: FIXED_HEADER_LEN, ..Default::default() }
    }

    fn push(&mut self, name: String, encoded_len: usize) -> u16 {
        let id = self.names.len() as u16;
        self.lookup.insert(name.clone(), id);
        self.names.push(name);
        self.used += encoded_len;
        id
    }
}

fn encoded_name_len(name: &str) -> Result<usize> {
    let kind = DataType::blob_for_len(name.len())?;
    Ok(1 + kind.blob_prefix_len().unwrap_or(0) + name.len())
}

/// In-memory header state.
///
/// Counters are atomics so scans and point reads can observe them without a
/// lock. The name table sits behind a read/write lock because readers may
/// look up ids while the writer registers new names.
#[derive(Debug)]
pub struct Header {
    capacity: usize,
    object_count: AtomicU64,
    tx_count: AtomicU64,
    names: RwLock<NameTable>,
}

impl Header {
    /// Create an empty header reserving `capacity` bytes on disk.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            object_count: AtomicU64::new(0),
            tx_count: AtomicU64::new(0),
            names: RwLock::new(NameTable::new()),
        }
    }

    /// Reserved size of the header region.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes of the reserved region currently in use.
    pub fn used_bytes(&self) -> usize {
        self.names.read().used
    }

    /// Return the id of `name`, registering it if it is new.
    pub fn add_name(&self, name: &str) -> Result<u16> {
        if let Some(&id) = self.names.read().lookup.get(name) {
            return Ok(id);
        }

        let mut table = self.names.write();
        if let Some(&id) = table.lookup.get(name) {
            return Ok(id);
        }

        if table.names.len() >= MAX_NAMES {
            return Err(Error::capacity(format!("name table already holds {} names", MAX_NAMES)));
        }

        let encoded_len = encoded_name_len(name)?;
        if table.used + encoded_len > self.capacity {
            return Err(Error::capacity(format!(
                "name {:?} needs {} bytes but only {} of {} header bytes are free",
                name,
                encoded_len,
                self.capacity - table.used,
                self.capacity
            )));
        }

        Ok(table.push(name.to_string(), encoded_len))
    }

    /// Id of a registered name.
    pub fn index_by_name(&self, name: &str) -> Option<u16> {
        self.names.read().lookup.get(name).copied()
    }

    /// Name registered under `id`.
    pub fn name_by_index(&self, id: u16) -> Option<String> {
        self.names.read().names.get(usize::from(id)).cloned()
    }

    /// All names, ordered by id.
    pub fn names(&self) -> Vec<String> {
        self.names.read().names.clone()
    }

    /// Number of registered names.
    pub fn name_count(&self) -> usize {
        self.names.read().names.len()
    }

    /// Number of objects ever added.
    pub fn object_count(&self) -> u64 {
        self.object_count.load(Ordering::Acquire)
    }

    /// Number of batches ever flushed.
    pub fn tx_count(&self) -> u64 {
        self.tx_count.load(Ordering::Acquire)
    }

    /// Add to the object counter and return the new value.
    pub fn add_object_count(&self, n: u64) -> u64 {
        self.object_count.fetch_add(n, Ordering::AcqRel) + n
    }

    /// Add to the transaction counter and return the new value.
    pub fn add_tx_count(&self, n: u64) -> u64 {
        self.tx_count.fetch_add(n, Ordering::AcqRel) + n
    }

    /// Serialize into a buffer of exactly `capacity` bytes.
    pub fn encode(&self) -> Result<BytesMut> {
        let table = self.names.read();
        if table.used > self.capacity {
            return Err(Error::capacity(format!(
                "header needs {} bytes but only {} are reserved",
                table.used, self.capacity
            )));
        }

        let mut buf = BytesMut::with_capacity(self.capacity);
        buf.put_slice(&MAGIC);
        buf.put_u32_le(VERSION);
        buf.put_u32_le(self.capacity as u32);
        buf.put_u64_le(self.object_count());
        buf.put_u64_le(self.tx_count());
        buf.put_u64_le(table.names.len() as u64);

        for name in &table.names {
            let kind = DataType::blob_for_len(name.len())?;
            buf.put_u8(kind as u8);
            buf.put_uint_le(name.len() as u64, kind.blob_prefix_len().unwrap_or(0));
            buf.put_slice(name.as_bytes());
        }

        debug_assert_eq!(buf.len(), table.used);
        buf.resize(self.capacity, 0);
        Ok(buf)
    }

    /// Parse a header. `data` must start at file offset 0 and cover at least
    /// the stored header size.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let capacity = Self::decode_size(data, data.len() as u64)?;
        let mut r = LeReader::at(&data[..capacity], MAGIC.len() + 8);

        let header = Header::new(capacity);
        header.object_count.store(r.read_u64()?, Ordering::Release);
        header.tx_count.store(r.read_u64()?, Ordering::Release);
        let count = r.read_u64()?;
        if count > MAX_NAMES as u64 {
            return Err(Error::corruption(format!("header declares {} names", count)));
        }

        {
            let mut table = header.names.write();
            for _ in 0..count {
                let start = r.position();
                let name = Self::decode_name(&mut r)?;
                if table.lookup.contains_key(&name) {
                    return Err(Error::corruption(format!("duplicate name {:?} in header", name)));
                }
                table.push(name, r.position() - start);
            }
        }

        Ok(header)
    }

    /// Validate magic and version and return the stored header size, which
    /// may not exceed `available` bytes.
    fn decode_size(data: &[u8], available: u64) -> Result<usize> {
        if data.len() < FIXED_HEADER_LEN {
            return Err(Error::corruption(format!(
                "header truncated: {} of {} bytes",
                data.len(),
                FIXED_HEADER_LEN
            )));
        }

        let mut r = LeReader::new(data);
        let magic = r.read_slice(MAGIC.len())?;
        if magic != MAGIC {
            return Err(Error::corruption(format!(
                "unexpected header magic {:?}, expected {:?}",
                magic, MAGIC
            )));
        }

        let version = r.read_u32()?;
        if version != VERSION {
            return Err(Error::corruption(format!(
                "invalid header version {}, expected {}",
                version, VERSION
            )));
        }

        let size = r.read_u32()? as usize;
        if size < FIXED_HEADER_LEN || size as u64 > available {
            return Err(Error::corruption(format!(
                "header size {} is outside of [{}, {}]",
                size, FIXED_HEADER_LEN, available
            )));
        }
        Ok(size)
    }

    fn decode_name(r: &mut LeReader<'_>) -> Result<String> {
        let name = r
            .read_u8()
            .and_then(DataType::from_u8)
            .and_then(|kind| {
                if !kind.is_blob() {
                    return Err(Error::corruption(format!("header name has type {:?}", kind)));
                }
                r.read_blob_of(kind)
            })
            .map_err(|e| match e {
                Error::OutOfBounds { .. } => {
                    Error::corruption(format!("name table runs past the header: {}", e))
                }
                other => other,
            })?;

        String::from_utf8(name.to_vec())
            .map_err(|e| Error::corruption(format!("header name is not UTF-8: {}", e)))
    }

    /// Write the header at offset 0 of `file`.
    pub fn persist(&self, file: &File) -> Result<()> {
        let buf = self.encode()?;
        io::write_all_at(file, &buf, 0)
    }

    /// Read the header of a file that is `file_len` bytes long.
    pub fn load(file: &File, file_len: u64) -> Result<Self> {
        if file_len < FIXED_HEADER_LEN as u64 {
            return Err(Error::corruption(format!(
                "file truncated: {} bytes is shorter than the header",
                file_len
            )));
        }

        let mut fixed = [0u8; FIXED_HEADER_LEN];
        io::read_exact_at(file, &mut fixed, 0)?;
        let size = Self::decode_size(&fixed, file_len)?;

        let mut data = vec![0u8; size];
        io::read_exact_at(file, &mut data, 0)?;
        Self::decode(&data)
    }
}
