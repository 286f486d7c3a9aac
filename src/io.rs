//! Positioned file I/O.
//!
//! All reads and writes address the file by absolute offset so that readers
//! can share one handle without a seek cursor.

use crate::error::{Error, Result};
use std::fs::File;
use std::io::ErrorKind;

#[cfg(unix)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.read_at(buf, offset)
}

#[cfg(windows)]
fn pread(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_read(buf, offset)
}

#[cfg(unix)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

#[cfg(windows)]
fn pwrite(file: &File, buf: &[u8], offset: u64) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}

/// Fill as much of `buf` as the file holds from `offset` on. Returns the
/// number of bytes read, which is only short at end of file.
pub(crate) fn read_full_at(file: &File, buf: &mut [u8], offset: u64) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match pread(file, &mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Fill all of `buf` from `offset`. End of file before `buf` is full is an
/// error.
pub(crate) fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> Result<()> {
    let n = read_full_at(file, buf, offset)?;
    if n < buf.len() {
        return Err(Error::Io(std::io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("read {} of {} bytes at offset {}", n, buf.len(), offset),
        )));
    }
    Ok(())
}

/// Write `buf` at `offset` with a single positioned write. A short write is
/// not retried.
pub(crate) fn write_all_at(file: &File, buf: &[u8], offset: u64) -> Result<()> {
    let written = loop {
        match pwrite(file, buf, offset) {
            Ok(n) => break n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    };

    if written != buf.len() {
        return Err(Error::ShortWrite { offset, expected: buf.len(), written });
    }
    Ok(())
}
