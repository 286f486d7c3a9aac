//! Single page cached reader.

use crate::error::{Error, Result};
use crate::io;
use parking_lot::RwLock;
use std::fs::File;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Statistics for cache performance monitoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of lookups
    pub lookups: u64,
    /// Lookups served from the cached page
    pub hits: u64,
    /// Lookups that reloaded the page
    pub misses: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }
}

#[derive(Debug)]
struct Page {
    /// File offset of `data[0]`.
    offset: u64,
    /// Valid bytes in `data`, short at end of file.
    filled: usize,
    data: Vec<u8>,
}

impl Page {
    fn slice(&self, offset: u64, len: usize) -> Option<&[u8]> {
        let start = usize::try_from(offset.checked_sub(self.offset)?).ok()?;
        let end = start.checked_add(len)?;
        if end <= self.filled {
            Some(&self.data[start..end])
        } else {
            None
        }
    }
}

/// Read-through cache over one file page.
///
/// The cache key is the most recently missed offset, not a fixed page grid,
/// so lookups alternating between two distant regions reload every time.
///
/// # Thread Safety
///
/// Safe to share between threads. Hits only take the read lock.
#[derive(Debug)]
pub struct CachedReader {
    file: Arc<File>,
    page_size: usize,
    page: RwLock<Page>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl CachedReader {
    /// Create a reader with an empty page of `page_size` bytes.
    pub fn new(file: Arc<File>, page_size: usize) -> Self {
        Self {
            file,
            page_size,
            page: RwLock::new(Page { offset: 0, filled: 0, data: vec![0u8; page_size] }),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Size of the cached page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Fill `dst` with the file bytes starting at `offset`.
    ///
    /// Ranges longer than a page bypass the cache and are read directly.
    /// Fails with [`Error::OutOfBounds`] if the range extends past the end
    /// of the file.
    pub fn read_at(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        if dst.len() > self.page_size {
            self.misses.fetch_add(1, Ordering::Relaxed);
            let n = io::read_full_at(&self.file, dst, offset)?;
            if n < dst.len() {
                return Err(Error::OutOfBounds {
                    pos: offset as usize,
                    len: dst.len(),
                    capacity: (offset as usize).saturating_add(n),
                });
            }
            return Ok(());
        }

        {
            let page = self.page.read();
            if let Some(bytes) = page.slice(offset, dst.len()) {
                dst.copy_from_slice(bytes);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
        }

        let mut page = self.page.write();
        // another reader may have loaded the page meanwhile
        if page.slice(offset, dst.len()).is_none() {
            let filled = io::read_full_at(&self.file, &mut page.data, offset)?;
            page.offset = offset;
            page.filled = filled;
            self.misses.fetch_add(1, Ordering::Relaxed);
            log::trace!("Cache page reloaded at offset {} ({} bytes)", offset, filled);
        } else {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }

        match page.slice(offset, dst.len()) {
            Some(bytes) => {
                dst.copy_from_slice(bytes);
                Ok(())
            }
            None => Err(Error::OutOfBounds {
                pos: offset as usize,
                len: dst.len(),
                capacity: (page.offset as usize).saturating_add(page.filled),
            }),
        }
    }

    /// Snapshot of the hit and miss counters.
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        CacheStats { lookups: hits + misses, hits, misses }
    }

    /// Reset the hit and miss counters.
    pub fn reset_stats(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}
