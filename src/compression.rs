//! Batch block compression.
//!
//! Compressed batches are stored as `[compressed_len: u32][block]`. The block
//! decompresses to exactly one encoded record.

use crate::config::CompressionType;
use crate::error::{Error, Result};

/// Length of the compressed length prefix in front of every block.
pub(crate) const COMPRESSED_PREFIX_LEN: usize = 4;

/// Low bits of a compressed object id, holding the object's offset inside
/// its decompressed batch. The high bits hold the batch's file offset.
pub(crate) const COMPRESSED_ID_SHIFT: u32 = 26;

/// Largest batch a compressed store can hold.
pub(crate) const MAX_COMPRESSED_BATCH_SIZE: usize = 1 << COMPRESSED_ID_SHIFT;

/// Compressed batches must start below this file offset.
pub(crate) const MAX_COMPRESSED_BATCH_OFFSET: u64 = 1 << (64 - COMPRESSED_ID_SHIFT);

/// Id of the first byte of the decompressed batch stored at `batch_offset`.
/// Adding an in-batch offset below [`MAX_COMPRESSED_BATCH_SIZE`] gives an
/// object id.
pub(crate) fn compressed_id_base(batch_offset: u64) -> Result<u64> {
    if batch_offset >= MAX_COMPRESSED_BATCH_OFFSET {
        return Err(Error::capacity(format!(
            "compressed batch offset {} exceeds the limit of {}",
            batch_offset, MAX_COMPRESSED_BATCH_OFFSET
        )));
    }
    Ok(batch_offset << COMPRESSED_ID_SHIFT)
}

/// Split a compressed object id into batch file offset and in-batch offset.
pub(crate) fn split_compressed_id(id: u64) -> (u64, usize) {
    let mask = (1u64 << COMPRESSED_ID_SHIFT) - 1;
    (id >> COMPRESSED_ID_SHIFT, (id & mask) as usize)
}

/// Upper bound of the compressed size of `len` input bytes.
pub(crate) fn max_compressed_len(kind: CompressionType, len: usize) -> Result<usize> {
    match kind {
        CompressionType::None => Ok(len),
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => lz4::block::compress_bound(len)
            .map_err(|e| Error::internal(format!("Compression bound failed: {}", e))),
    }
}

/// Compress `src` into `dst`, which must hold at least
/// [`max_compressed_len`] bytes. Returns the number of bytes written.
pub(crate) fn compress(kind: CompressionType, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    let bound = max_compressed_len(kind, src.len())?;
    if dst.len() < bound {
        return Err(Error::internal(format!(
            "compression buffer of {} bytes is below the bound of {} bytes",
            dst.len(),
            bound
        )));
    }

    match kind {
        CompressionType::None => {
            dst[..src.len()].copy_from_slice(src);
            Ok(src.len())
        }
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => lz4::block::compress_to_buffer(src, None, false, dst)
            .map_err(|e| Error::internal(format!("Compression failed: {}", e))),
    }
}

/// Decompress `src` into `dst`, which must be large enough for the uncompressed
/// input. Returns the decompressed length.
pub(crate) fn decompress(kind: CompressionType, src: &[u8], dst: &mut [u8]) -> Result<usize> {
    match kind {
        CompressionType::None => {
            if src.len() > dst.len() {
                return Err(Error::corruption(format!(
                    "block of {} bytes exceeds buffer of {} bytes",
                    src.len(),
                    dst.len()
                )));
            }
            dst[..src.len()].copy_from_slice(src);
            Ok(src.len())
        }
        #[cfg(feature = "lz4-compression")]
        CompressionType::Lz4 => {
            let capacity = i32::try_from(dst.len()).unwrap_or(i32::MAX);
            lz4::block::decompress_to_buffer(src, Some(capacity), dst)
                .map_err(|e| Error::corruption(format!("Decompression failed: {}", e)))
        }
    }
}
