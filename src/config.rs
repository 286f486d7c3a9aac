//! Configuration options for LogDb.

use crate::buffer::MAX_UINT24;
use crate::header::FIXED_HEADER_LEN;
use crate::object::OBJECT_HEADER_LEN;
use crate::record::RECORD_HEADER_LEN;

/// Default reserved header size: room for a name table of roughly 16 MiB.
pub const DEFAULT_HEADER_SIZE: usize = 255 * 65535;

/// Default maximum encoded size of a single object.
pub const DEFAULT_MAX_OBJECT_SIZE: usize = 64 * 1024;

/// Configuration options for opening a database.
#[derive(Debug, Clone)]
pub struct Options {
    /// Create the database file if it doesn't exist.
    /// Default: true
    pub create_if_missing: bool,

    /// Reserved size of the header region at the start of a new file (in bytes).
    /// Existing files keep the size they were created with.
    /// Default: 255 * 65535 (~16MB)
    pub header_size: usize,

    /// Maximum encoded size of one object (in bytes), at most 2^24 - 1.
    /// Default: 64KB
    pub max_object_size: usize,

    /// Maximum size of one batch (in bytes). A batch is flushed as soon as it
    /// can no longer hold an object of `max_object_size`.
    /// Default: 1000 * 64KB
    pub max_batch_size: usize,

    /// Serve scans from a read-only memory map instead of positioned reads.
    /// Default: false
    pub use_mmap: bool,

    /// Block compression applied to each batch.
    /// Default: CompressionType::None
    pub compression: CompressionType,

    /// Sync file data to disk after every flushed batch.
    /// Default: false
    pub sync_on_flush: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            header_size: DEFAULT_HEADER_SIZE,
            max_object_size: DEFAULT_MAX_OBJECT_SIZE,
            max_batch_size: DEFAULT_MAX_OBJECT_SIZE * 1000,
            use_mmap: false,
            compression: CompressionType::None,
            sync_on_flush: false,
        }
    }
}

/// Compression algorithms supported by LogDb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression, batches are written as they are.
    #[default]
    None = 0,

    /// LZ4 block compression, each batch prefixed with its compressed length.
    #[cfg(feature = "lz4-compression")]
    Lz4 = 1,
}

impl CompressionType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            #[cfg(feature = "lz4-compression")]
            1 => Some(CompressionType::Lz4),
            _ => None,
        }
    }

    /// Returns true if batches are stored compressed.
    pub fn is_enabled(self) -> bool {
        self != CompressionType::None
    }
}

impl Options {
    /// Creates a new Options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether to create the database file if it doesn't exist.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets the reserved header size for newly created files.
    pub fn header_size(mut self, size: usize) -> Self {
        self.header_size = size;
        self
    }

    /// Sets the maximum object size.
    pub fn max_object_size(mut self, size: usize) -> Self {
        self.max_object_size = size;
        self
    }

    /// Sets the maximum batch size.
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Enables or disables memory mapped scans.
    pub fn use_mmap(mut self, value: bool) -> Self {
        self.use_mmap = value;
        self
    }

    /// Sets the compression algorithm.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Enables or disables syncing after each flushed batch.
    pub fn sync_on_flush(mut self, value: bool) -> Self {
        self.sync_on_flush = value;
        self
    }

    /// Validates the options and returns an error if any are invalid.
    pub fn validate(&self) -> crate::Result<()> {
        if self.header_size < FIXED_HEADER_LEN || self.header_size > u32::MAX as usize {
            return Err(crate::Error::invalid_argument(format!(
                "header_size must be between {} and {}",
                FIXED_HEADER_LEN,
                u32::MAX
            )));
        }
        if self.max_object_size <= OBJECT_HEADER_LEN || self.max_object_size > MAX_UINT24 {
            return Err(crate::Error::invalid_argument(format!(
                "max_object_size must be between {} and {}",
                OBJECT_HEADER_LEN + 1,
                MAX_UINT24
            )));
        }
        if self.max_batch_size < RECORD_HEADER_LEN + self.max_object_size {
            return Err(crate::Error::invalid_argument(
                "max_batch_size must hold at least one object of max_object_size",
            ));
        }
        if self.max_batch_size > u32::MAX as usize {
            return Err(crate::Error::invalid_argument("max_batch_size must fit into 32 bits"));
        }
        if self.compression.is_enabled()
            && self.max_batch_size > crate::compression::MAX_COMPRESSED_BATCH_SIZE
        {
            return Err(crate::Error::invalid_argument(format!(
                "max_batch_size of a compressed store must not exceed {}",
                crate::compression::MAX_COMPRESSED_BATCH_SIZE
            )));
        }
        Ok(())
    }
}
