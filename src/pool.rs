//! Pool of reusable scratch buffers for point reads.

use crossbeam::queue::ArrayQueue;
use std::ops::{Deref, DerefMut};

/// Lock-free pool of equally sized byte buffers.
///
/// Buffers are handed out as [`PooledBuf`] guards and go back into the pool
/// when the guard is dropped. At most `max_idle` buffers are kept; surplus
/// buffers are freed.
#[derive(Debug)]
pub(crate) struct BufferPool {
    queue: ArrayQueue<Vec<u8>>,
    buf_size: usize,
}

impl BufferPool {
    pub(crate) fn new(buf_size: usize, max_idle: usize) -> Self {
        Self { queue: ArrayQueue::new(max_idle.max(1)), buf_size }
    }

    /// Take a buffer of `buf_size` bytes, allocating if the pool is empty.
    pub(crate) fn get(&self) -> PooledBuf<'_> {
        let buf = self.queue.pop().unwrap_or_else(|| vec![0u8; self.buf_size]);
        PooledBuf { buf, pool: self }
    }

    #[cfg(test)]
    pub(crate) fn idle(&self) -> usize {
        self.queue.len()
    }
}

/// A buffer borrowed from a [`BufferPool`].
#[derive(Debug)]
pub(crate) struct PooledBuf<'a> {
    buf: Vec<u8>,
    pool: &'a BufferPool,
}

impl PooledBuf<'_> {
    /// Grow the buffer to at least `len` bytes.
    pub(crate) fn ensure_len(&mut self, len: usize) {
        if self.buf.len() < len {
            self.buf.resize(len, 0);
        }
    }
}

impl Deref for PooledBuf<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for PooledBuf<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for PooledBuf<'_> {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        if buf.len() != self.pool.buf_size {
            return;
        }
        // full pool: let the buffer go
        let _ = self.pool.queue.push(buf);
    }
}
