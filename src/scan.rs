//! Batch loading and full scans.
//!
//! A [`BatchSource`] knows where the batches of a file live and how they are
//! framed. It loads one batch at a time either with positioned reads or as a
//! slice of a read-only memory map, decompressing into a caller owned buffer
//! when the store is compressed.

use crate::compression::{self, COMPRESSED_PREFIX_LEN};
use crate::config::CompressionType;
use crate::error::{Error, Result};
use crate::io;
use crate::object::ObjectView;
use crate::record::{RecordView, RECORD_HEADER_LEN};
use crossbeam::utils::CachePadded;
use std::fs::File;

/// Private buffers of one scanning thread.
#[derive(Debug, Default)]
pub(crate) struct ScanBuffers {
    batch: Vec<u8>,
    compressed: Vec<u8>,
}

fn ensure_len(buf: &mut Vec<u8>, len: usize) {
    if buf.len() < len {
        buf.resize(len, 0);
    }
}

/// The most recently decompressed batch, kept for point reads on a
/// compressed store.
#[derive(Debug, Default)]
pub(crate) struct InflatedBatch {
    offset: Option<u64>,
    len: usize,
    bufs: ScanBuffers,
}

impl InflatedBatch {
    /// View of the compressed batch at `offset`, decompressed on a miss.
    pub(crate) fn get<'s>(
        &'s mut self,
        source: &BatchSource<'_>,
        offset: u64,
    ) -> Result<RecordView<'s>> {
        if !source.compression.is_enabled() {
            return Err(Error::internal("batch cache used on an uncompressed store"));
        }
        if self.offset != Some(offset) {
            self.offset = None;
            let len = source.load(offset, &mut self.bufs)?.view.size();
            log::trace!("Decompressed batch at offset {} for point reads ({} bytes)", offset, len);
            self.offset = Some(offset);
            self.len = len;
        }
        RecordView::parse(&self.bufs.batch[..self.len])
    }
}

/// One batch ready for iteration.
#[derive(Debug)]
pub(crate) struct LoadedBatch<'b> {
    pub(crate) view: RecordView<'b>,
    /// Object id of the batch's first byte. For raw batches this is the file
    /// offset; compressed batches use [`compression::compressed_id_base`].
    pub(crate) base: u64,
    /// Bytes the batch occupies in the file, including framing.
    pub(crate) framed_len: u64,
}

/// Read access to the batches between the end of the header and `eof`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BatchSource<'a> {
    pub(crate) file: &'a File,
    /// Whole file mapped from offset 0, at least `eof` bytes long.
    pub(crate) map: Option<&'a [u8]>,
    pub(crate) start: u64,
    pub(crate) eof: u64,
    pub(crate) compression: CompressionType,
    pub(crate) max_batch_size: usize,
}

impl<'a> BatchSource<'a> {
    fn min_frame_len(&self) -> u64 {
        if self.compression.is_enabled() {
            COMPRESSED_PREFIX_LEN as u64
        } else {
            RECORD_HEADER_LEN as u64
        }
    }

    /// Bytes left from `offset` to the end of the file, which must hold at
    /// least the batch framing.
    fn available(&self, offset: u64) -> Result<u64> {
        let avail = self.eof.saturating_sub(offset);
        if avail < self.min_frame_len() {
            return Err(Error::corruption(format!(
                "batch framing at offset {} truncated: {} bytes left before end of file at {}",
                offset, avail, self.eof
            )));
        }
        Ok(avail)
    }

    fn read_prefix(&self, offset: u64) -> Result<u32> {
        let mut prefix = [0u8; COMPRESSED_PREFIX_LEN];
        match self.map {
            Some(map) => {
                let start = offset as usize;
                prefix.copy_from_slice(&map[start..start + COMPRESSED_PREFIX_LEN]);
            }
            None => io::read_exact_at(self.file, &mut prefix, offset)?,
        }
        Ok(u32::from_le_bytes(prefix))
    }

    fn truncated(&self, offset: u64, framed: u64) -> Error {
        Error::corruption(format!(
            "batch at offset {} with {} bytes runs past end of file at {}",
            offset, framed, self.eof
        ))
    }

    /// Start offsets of all batches, found by reading framing only.
    pub(crate) fn batch_offsets(&self) -> Result<Vec<u64>> {
        let mut offsets = Vec::new();
        let mut offset = self.start;

        while offset < self.eof {
            let avail = self.available(offset)?;
            let len = u64::from(self.read_prefix(offset)?);
            let framed = if self.compression.is_enabled() {
                COMPRESSED_PREFIX_LEN as u64 + len
            } else if len < RECORD_HEADER_LEN as u64 {
                return Err(Error::corruption(format!(
                    "batch at offset {} declares only {} bytes",
                    offset, len
                )));
            } else {
                len
            };

            if framed > avail {
                return Err(self.truncated(offset, framed));
            }
            offsets.push(offset);
            offset += framed;
        }

        Ok(offsets)
    }

    /// Load the batch starting at `offset`.
    pub(crate) fn load<'b>(
        &'b self,
        offset: u64,
        bufs: &'b mut ScanBuffers,
    ) -> Result<LoadedBatch<'b>> {
        let avail = self.available(offset)?;
        match (self.map, self.compression.is_enabled()) {
            (Some(map), false) => {
                let data = &map[offset as usize..self.eof as usize];
                let view = RecordView::parse(data)?;
                Ok(LoadedBatch { view, base: offset, framed_len: view.size() as u64 })
            }
            (None, false) => self.read_raw(offset, avail, &mut bufs.batch),
            (Some(map), true) => {
                let clen = self.read_prefix(offset)? as usize;
                let framed = (COMPRESSED_PREFIX_LEN + clen) as u64;
                if framed > avail {
                    return Err(self.truncated(offset, framed));
                }
                let base = compression::compressed_id_base(offset)?;
                let start = offset as usize + COMPRESSED_PREFIX_LEN;
                let view = self.inflate(offset, &map[start..start + clen], &mut bufs.batch)?;
                Ok(LoadedBatch { view, base, framed_len: framed })
            }
            (None, true) => {
                let clen = self.read_prefix(offset)? as usize;
                let framed = (COMPRESSED_PREFIX_LEN + clen) as u64;
                if framed > avail {
                    return Err(self.truncated(offset, framed));
                }
                let base = compression::compressed_id_base(offset)?;
                ensure_len(&mut bufs.compressed, clen);
                let block_offset = offset + COMPRESSED_PREFIX_LEN as u64;
                io::read_exact_at(self.file, &mut bufs.compressed[..clen], block_offset)?;
                let view = self.inflate(offset, &bufs.compressed[..clen], &mut bufs.batch)?;
                Ok(LoadedBatch { view, base, framed_len: framed })
            }
        }
    }

    fn read_raw<'b>(
        &self,
        offset: u64,
        avail: u64,
        batch: &'b mut Vec<u8>,
    ) -> Result<LoadedBatch<'b>> {
        let want = usize::try_from(avail).unwrap_or(usize::MAX).min(self.max_batch_size);
        ensure_len(batch, want);
        let n = io::read_full_at(self.file, &mut batch[..want], offset)?;

        let size = RecordView::peek_size(&batch[..n])?;
        if size as u64 > avail {
            return Err(self.truncated(offset, size as u64));
        }
        if size > n {
            log::warn!(
                "Batch at offset {} has {} bytes, above the configured maximum of {}",
                offset,
                size,
                self.max_batch_size
            );
            ensure_len(batch, size);
            io::read_exact_at(self.file, &mut batch[n..size], offset + n as u64)?;
        }

        let view = RecordView::parse(&batch[..size])?;
        Ok(LoadedBatch { view, base: offset, framed_len: size as u64 })
    }

    fn inflate<'b>(
        &self,
        offset: u64,
        block: &[u8],
        batch: &'b mut Vec<u8>,
    ) -> Result<RecordView<'b>> {
        ensure_len(batch, self.max_batch_size);
        let n = compression::decompress(self.compression, block, batch).map_err(|e| {
            Error::corruption(format!("batch at offset {} does not decompress: {}", offset, e))
        })?;

        let view = RecordView::parse(&batch[..n])?;
        if view.size() != n {
            return Err(Error::corruption(format!(
                "batch at offset {} decompresses to {} bytes but declares {}",
                offset,
                n,
                view.size()
            )));
        }
        Ok(view)
    }

    /// Visit every object in file order.
    pub(crate) fn scan<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(u64, ObjectView<'_>) -> Result<()>,
    {
        let mut bufs = ScanBuffers::default();
        let mut offset = self.start;
        while offset < self.eof {
            let batch = self.load(offset, &mut bufs)?;
            batch.view.for_each(batch.base, &mut visit)?;
            offset += batch.framed_len;
        }
        Ok(())
    }

    fn scan_range<F>(&self, worker: usize, offsets: &[u64], visit: &F) -> Result<()>
    where
        F: Fn(usize, u64, ObjectView<'_>) -> Result<()> + Sync,
    {
        let mut bufs = CachePadded::new(ScanBuffers::default());
        for &offset in offsets {
            let batch = self.load(offset, &mut bufs)?;
            batch.view.for_each(batch.base, |id, obj| visit(worker, id, obj))?;
        }
        Ok(())
    }

    /// Visit every object from `concurrency` threads.
    ///
    /// The batch list is split into contiguous chunks of equal length, the
    /// last chunk taking the remainder. All workers run to completion; the
    /// first failure in worker order is returned.
    pub(crate) fn scan_parallel<F>(&self, concurrency: usize, visit: &F) -> Result<()>
    where
        F: Fn(usize, u64, ObjectView<'_>) -> Result<()> + Sync,
    {
        if concurrency == 0 {
            return Err(Error::invalid_argument("concurrency must be at least 1"));
        }

        let offsets = self.batch_offsets()?;
        let chunk = offsets.len() / concurrency;
        if chunk == 0 && offsets.len() > 1 {
            log::debug!(
                "{} batches for {} workers: the last worker scans all of them",
                offsets.len(),
                concurrency
            );
        }
        log::debug!(
            "Parallel scan of {} batches with {} workers ({} batches each)",
            offsets.len(),
            concurrency,
            chunk
        );

        let results = crossbeam::thread::scope(|s| {
            let handles: Vec<_> = (0..concurrency)
                .map(|worker| {
                    let start = worker * chunk;
                    let end = if worker + 1 == concurrency { offsets.len() } else { start + chunk };
                    let range = &offsets[start..end];
                    s.spawn(move |_| self.scan_range(worker, range, visit))
                })
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle.join().unwrap_or_else(|_| Err(Error::internal("scan worker panicked")))
                })
                .collect::<Vec<_>>()
        })
        .map_err(|_| Error::internal("scan worker panicked"))?;

        results.into_iter().collect()
    }
}
