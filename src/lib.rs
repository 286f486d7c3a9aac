//! # LogDb - An Append-Only Log-Structured Row Store
//!
//! LogDb stores self-describing rows ("objects") in one flat file and is
//! built for two things: very fast sequential appends and full scans that
//! spread over many threads. There are no indexes, updates or deletes.
//!
//! ## Architecture
//!
//! - **Header**: fixed region at offset 0 with counters and the field name table
//! - **Object**: one row, a list of `(field id, type, value)` triples
//! - **Record**: a batch of objects, the unit of I/O
//! - **Cached reader**: single page read-through cache for point reads
//! - **Scanner**: sequential and parallel full scans, by positioned reads or
//!   through a memory map, with optional LZ4 batch compression
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use logdb::{DB, Options};
//!
//! # fn main() -> Result<(), logdb::Error> {
//! let mut db = DB::open("./sensors.logdb", Options::default())?;
//! let temperature = db.put_name("temperature")?;
//! let station = db.put_name("station")?;
//!
//! db.add(|obj| {
//!     obj.add_f32(temperature, 21.5)?;
//!     obj.add_str(station, "north")
//! })?;
//! db.flush()?;
//!
//! db.for_each(|id, obj| {
//!     println!("{}: {:?}", id, obj.field(temperature)?.and_then(|f| f.as_f64()));
//!     Ok(())
//! })?;
//! db.close()?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod buffer;
pub mod cache;
pub mod config;
pub mod error;
pub mod header;
pub mod object;
pub mod record;
pub mod types;

mod compression;
mod io;
mod pool;
mod scan;

// Re-exports
pub use cache::CacheStats;
pub use config::{CompressionType, Options};
pub use error::{Error, Result};
pub use object::{Field, Object, ObjectView};
pub use record::{Record, RecordView};
pub use types::{DataType, Value};

use buffer::LeReader;
use cache::CachedReader;
use compression::COMPRESSED_PREFIX_LEN;
use header::Header;
use memmap2::{Mmap, MmapOptions};
use object::OBJECT_HEADER_LEN;
use parking_lot::Mutex;
use pool::BufferPool;
use record::RECORD_HEADER_LEN;
use scan::{BatchSource, InflatedBatch};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Idle point-read buffers kept around between calls.
const MAX_IDLE_READ_BUFFERS: usize = 64;

/// The main database handle.
///
/// Writing (`add`, `flush`, `close`) needs `&mut self`, so there is exactly
/// one writer. Reading (`read`, `for_each`, `for_each_p`) and the name table
/// work through `&self` and may be used from many threads at once, for
/// example by sharing the handle behind an `Arc` once writing is done.
///
/// Only flushed batches are visible to readers.
pub struct DB {
    /// Database file path
    path: PathBuf,

    /// Configuration options
    options: Options,

    /// Shared with the cached reader
    file: Arc<File>,

    /// Counters and name table
    header: Header,

    /// End of the last flushed batch
    eof: u64,

    /// Batch being filled by `add`
    pending: Record,

    /// Object being encoded by `add`
    scratch: Object,

    /// Compression output, prefix included
    compressed: Vec<u8>,

    /// Page cache for point reads
    reader: CachedReader,

    /// Object buffers for point reads
    buffers: BufferPool,

    /// Read-only mapping, replaced when it no longer covers `eof`
    mmap: Mutex<Option<Arc<Mmap>>>,

    /// Header changed since it was last written
    dirty: AtomicBool,

    /// Set by `close`, which already wrote everything
    closed: bool,

    /// Set when a batch write failed; no further writes are accepted
    failed: bool,

    /// Last decompressed batch, for point reads on compressed stores
    inflated: Mutex<InflatedBatch>,
}

impl DB {
    /// Opens the database file at `path`.
    ///
    /// An empty (or newly created) file gets a fresh header of
    /// `options.header_size` bytes. An existing file keeps the header size
    /// it was created with.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The options are invalid
    /// - The file does not exist and `create_if_missing` is false
    /// - The file is shorter than its header, or magic or version mismatch
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use logdb::{DB, Options};
    ///
    /// # fn main() -> Result<(), logdb::Error> {
    /// let options = Options::default().use_mmap(true);
    /// let db = DB::open("./my_database.logdb", options)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Validate options
        options.validate()?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(options.create_if_missing)
            .open(&path)?;
        let len = file.metadata()?.len();

        let (header, eof) = if len == 0 {
            let header = Header::new(options.header_size);
            header.persist(&file)?;
            if options.sync_on_flush {
                file.sync_data()?;
            }
            log::info!("Created {:?} with a {} byte header", path, header.capacity());
            let eof = header.capacity() as u64;
            (header, eof)
        } else {
            let header = Header::load(&file, len)?;
            log::info!(
                "Opened {:?}: {} bytes, {} names, {} objects, last transaction {}",
                path,
                len,
                header.name_count(),
                header.object_count(),
                header.tx_count()
            );
            (header, len)
        };

        let file = Arc::new(file);
        let db = Self {
            reader: CachedReader::new(Arc::clone(&file), options.max_batch_size),
            buffers: BufferPool::new(options.max_object_size, MAX_IDLE_READ_BUFFERS),
            pending: Record::with_capacity(options.max_batch_size),
            scratch: Object::with_capacity(options.max_object_size),
            compressed: Vec::new(),
            mmap: Mutex::new(None),
            dirty: AtomicBool::new(false),
            closed: false,
            failed: false,
            inflated: Mutex::new(InflatedBatch::default()),
            path,
            options,
            file,
            header,
            eof,
        };

        db.mapping()?;
        Ok(db)
    }

    /// Path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Options the database was opened with.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Bytes of flushed data, header included.
    pub fn file_size(&self) -> u64 {
        self.eof
    }

    /// Reserved size of the header region; the first batch starts here.
    pub fn header_size(&self) -> usize {
        self.header.capacity()
    }

    /// Number of objects added over the lifetime of the file.
    pub fn object_count(&self) -> u64 {
        self.header.object_count()
    }

    /// Number of batches flushed over the lifetime of the file.
    pub fn tx_count(&self) -> u64 {
        self.header.tx_count()
    }

    /// Returns the id of `name`, registering it if it is new.
    ///
    /// Ids are dense, start at 0 and never change.
    pub fn put_name(&self, name: &str) -> Result<u16> {
        let before = self.header.name_count();
        let id = self.header.add_name(name)?;
        if self.header.name_count() != before {
            self.dirty.store(true, Ordering::Release);
        }
        Ok(id)
    }

    /// Id of a registered name.
    pub fn index_by_name(&self, name: &str) -> Option<u16> {
        self.header.index_by_name(name)
    }

    /// Name registered under `id`.
    pub fn name_by_index(&self, id: u16) -> Option<String> {
        self.header.name_by_index(id)
    }

    /// All registered names, ordered by id.
    pub fn names(&self) -> Vec<String> {
        self.header.names()
    }

    /// Hit and miss counters of the point-read cache.
    pub fn cache_stats(&self) -> CacheStats {
        self.reader.stats()
    }

    /// Appends one object, encoded by `encode`.
    ///
    /// The pending batch is flushed first if it could not take an object of
    /// the maximum size. If `encode` fails nothing is appended and the error
    /// is returned as is.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use logdb::{DB, Options};
    ///
    /// # fn main() -> Result<(), logdb::Error> {
    /// let mut db = DB::open("./my_database.logdb", Options::default())?;
    /// let id = db.put_name("id")?;
    /// for i in 0..1000u64 {
    ///     db.add(|obj| obj.add_u64(id, i))?;
    /// }
    /// db.close()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn add<F>(&mut self, encode: F) -> Result<()>
    where
        F: FnOnce(&mut Object) -> Result<()>,
    {
        self.check_writable()?;
        if self.pending.remaining() < self.options.max_object_size {
            self.flush()?;
        }

        self.scratch.reset();
        encode(&mut self.scratch)?;
        self.pending.push(&self.scratch)?;
        self.header.add_object_count(1);
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Appends the pending batch to the file. Does nothing if no object was
    /// added since the last flush.
    ///
    /// Everything added before a successful flush is readable after a
    /// reopen, provided the header is written by `close` or on drop.
    ///
    /// A failed batch write is not retried: the handle refuses all further
    /// writes and is not persisted on drop.
    pub fn flush(&mut self) -> Result<()> {
        self.check_writable()?;
        if self.pending.is_empty() {
            return Ok(());
        }

        let offset = self.eof;
        let raw_len = self.pending.size();
        let framed = match self.compress_pending(offset)? {
            Some(n) => &self.compressed[..n],
            None => self.pending.as_bytes(),
        };
        let written = framed.len();

        let result = io::write_all_at(&self.file, framed, offset).and_then(|()| {
            if self.options.sync_on_flush {
                self.file.sync_data()?;
            }
            Ok(())
        });
        if let Err(e) = result {
            self.failed = true;
            log::error!("Writing batch at offset {} of {:?} failed: {}", offset, self.path, e);
            return Err(e);
        }

        if self.options.compression.is_enabled() {
            log::debug!(
                "Flushed batch of {} objects at offset {}: {} bytes compressed to {}",
                self.pending.object_count(),
                offset,
                raw_len,
                written - COMPRESSED_PREFIX_LEN
            );
        } else {
            log::debug!(
                "Flushed batch of {} objects at offset {}: {} bytes",
                self.pending.object_count(),
                offset,
                written
            );
        }

        self.eof += written as u64;
        self.header.add_tx_count(1);
        self.pending.reset();
        self.dirty.store(true, Ordering::Release);
        Ok(())
    }

    /// Compresses the pending batch into `self.compressed`, length prefix
    /// included, and returns the framed length. `None` if the store is not
    /// compressed.
    fn compress_pending(&mut self, offset: u64) -> Result<Option<usize>> {
        let kind = self.options.compression;
        if !kind.is_enabled() {
            return Ok(None);
        }
        // object ids of the batch must be representable
        compression::compressed_id_base(offset)?;

        let raw = self.pending.as_bytes();
        let bound = compression::max_compressed_len(kind, raw.len())?;
        if self.compressed.len() < COMPRESSED_PREFIX_LEN + bound {
            self.compressed.resize(COMPRESSED_PREFIX_LEN + bound, 0);
        }

        let dst = &mut self.compressed[COMPRESSED_PREFIX_LEN..];
        let n = compression::compress(kind, raw, dst)?;
        let clen = u32::try_from(n).map_err(|_| {
            Error::capacity(format!("compressed batch of {} bytes overflows u32", n))
        })?;
        self.compressed[..COMPRESSED_PREFIX_LEN].copy_from_slice(&clen.to_le_bytes());
        Ok(Some(COMPRESSED_PREFIX_LEN + n))
    }

    fn check_writable(&self) -> Result<()> {
        if self.failed {
            return Err(Error::internal(format!(
                "{:?} accepts no more writes after a failed batch write",
                self.path
            )));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.flush()?;
        if self.dirty.swap(false, Ordering::AcqRel) {
            self.header.persist(&self.file)?;
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// Flushes pending objects, writes the header and closes the file.
    ///
    /// # Errors
    ///
    /// Returns an error if flushing or writing the header fails.
    pub fn close(mut self) -> Result<()> {
        // a failed close is not repeated by drop
        self.closed = true;
        self.finish()?;
        log::info!(
            "Closed {:?}: {} objects in {} transactions",
            self.path,
            self.header.object_count(),
            self.header.tx_count()
        );
        Ok(())
    }

    /// Current mapping of the file, refreshed if it no longer covers all
    /// flushed batches. `None` unless `use_mmap` is set.
    fn mapping(&self) -> Result<Option<Arc<Mmap>>> {
        if !self.options.use_mmap {
            return Ok(None);
        }

        let mut slot = self.mmap.lock();
        if let Some(map) = slot.as_ref() {
            if map.len() as u64 >= self.eof {
                return Ok(Some(Arc::clone(map)));
            }
        }

        // SAFETY: the mapping is read-only and covers bytes up to `eof`.
        // Batches below `eof` are never rewritten, and the header at offset 0
        // is only rewritten through `&mut self`, which cannot coexist with
        // the `&self` borrow readers hold while using the mapping.
        let map = unsafe { MmapOptions::new().len(self.eof as usize).map(&*self.file)? };
        log::debug!("Mapped {} bytes of {:?}", map.len(), self.path);

        let map = Arc::new(map);
        *slot = Some(Arc::clone(&map));
        Ok(Some(map))
    }

    fn source<'a>(&'a self, map: Option<&'a Mmap>) -> BatchSource<'a> {
        BatchSource {
            file: &self.file,
            map: map.map(|m| &m[..]),
            start: self.header.capacity() as u64,
            eof: self.eof,
            compression: self.options.compression,
            max_batch_size: self.options.max_batch_size,
        }
    }

    /// Reads the object with id `id` and hands it to `visit`.
    ///
    /// `id` is an id yielded by [`DB::for_each`] or [`DB::for_each_p`]. In
    /// an uncompressed store it is the object's file offset. In a compressed
    /// store it combines the batch offset with the position inside the
    /// decompressed batch, and the most recently used batch is kept
    /// decompressed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for ids outside of the flushed
    /// data and [`Error::Corruption`] if the object does not fit the file.
    pub fn read<F, R>(&self, id: u64, visit: F) -> Result<R>
    where
        F: FnOnce(ObjectView<'_>) -> Result<R>,
    {
        if self.options.compression.is_enabled() {
            return self.read_compressed(id, visit);
        }

        let start = self.header.capacity() as u64;
        let in_range = id >= start
            && id.checked_add(OBJECT_HEADER_LEN as u64).is_some_and(|end| end <= self.eof);
        if !in_range {
            return Err(Error::invalid_argument(format!(
                "offset {} is outside of the data region [{}, {})",
                id, start, self.eof
            )));
        }

        let mut prefix = [0u8; OBJECT_HEADER_LEN];
        self.reader.read_at(id, &mut prefix)?;
        let size = LeReader::new(&prefix).read_u24()? as usize;
        if size < OBJECT_HEADER_LEN || size as u64 > self.eof - id {
            return Err(Error::corruption(format!(
                "object at offset {} declares {} bytes with {} left before end of file",
                id,
                size,
                self.eof - id
            )));
        }

        let mut buf = self.buffers.get();
        buf.ensure_len(size);
        self.reader.read_at(id, &mut buf[..size])?;
        visit(ObjectView::parse(&buf[..size])?)
    }

    fn read_compressed<F, R>(&self, id: u64, visit: F) -> Result<R>
    where
        F: FnOnce(ObjectView<'_>) -> Result<R>,
    {
        let (batch, pos) = compression::split_compressed_id(id);
        let start = self.header.capacity() as u64;
        if batch < start || batch >= self.eof {
            return Err(Error::invalid_argument(format!(
                "object id {} names batch offset {} outside of the data region [{}, {})",
                id, batch, start, self.eof
            )));
        }

        let map = self.mapping()?;
        let source = self.source(map.as_deref());
        let mut buf = self.buffers.get();
        let size = {
            let mut inflated = self.inflated.lock();
            let record = inflated.get(&source, batch)?;
            let data = record.as_bytes();
            if pos < RECORD_HEADER_LEN || pos >= data.len() {
                return Err(Error::invalid_argument(format!(
                    "object id {} points past the {} byte batch at offset {}",
                    id,
                    data.len(),
                    batch
                )));
            }

            let obj = ObjectView::parse(&data[pos..])?;
            buf.ensure_len(obj.size());
            buf[..obj.size()].copy_from_slice(obj.as_bytes());
            obj.size()
        };

        // `visit` runs without holding the batch lock
        visit(ObjectView::parse(&buf[..size])?)
    }

    /// Visits every flushed object in file order with its offset.
    ///
    /// Stops at the first error, either from `visit` or from a malformed
    /// batch.
    pub fn for_each<F>(&self, visit: F) -> Result<()>
    where
        F: FnMut(u64, ObjectView<'_>) -> Result<()>,
    {
        let map = self.mapping()?;
        self.source(map.as_deref()).scan(visit)
    }

    /// Visits every flushed object from `concurrency` threads.
    ///
    /// The batches are split into `concurrency` contiguous ranges and each
    /// thread walks its range in file order; `visit` gets the worker index,
    /// the object offset and the object. There is no order across workers.
    /// A failing worker stops its own range only, and the first error is
    /// returned after all workers are done.
    ///
    /// Each worker gets `batches / concurrency` batches and the last one
    /// also takes the remainder, so with fewer batches than workers the
    /// last worker scans everything.
    pub fn for_each_p<F>(&self, concurrency: usize, visit: F) -> Result<()>
    where
        F: Fn(usize, u64, ObjectView<'_>) -> Result<()> + Sync,
    {
        let map = self.mapping()?;
        self.source(map.as_deref()).scan_parallel(concurrency, &visit)
    }

    /// File offsets of all flushed batches.
    pub fn batch_offsets(&self) -> Result<Vec<u64>> {
        let map = self.mapping()?;
        self.source(map.as_deref()).batch_offsets()
    }
}

impl std::fmt::Debug for DB {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DB")
            .field("path", &self.path)
            .field("header_size", &self.header.capacity())
            .field("eof", &self.eof)
            .field("pending_objects", &self.pending.object_count())
            .finish_non_exhaustive()
    }
}

impl Drop for DB {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if self.failed {
            log::error!("Not persisting the header of {:?} after a failed batch write", self.path);
            return;
        }

        // Errors cannot be propagated from drop
        if let Err(e) = self.finish() {
            log::error!("Error closing {:?} during drop: {}", self.path, e);
        }
    }
}
