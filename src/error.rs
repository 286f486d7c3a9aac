//! Error types for LogDb.

use std::io;
use thiserror::Error;

/// The result type used throughout LogDb.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for LogDb operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The file does not follow the expected layout: bad magic, bad version,
    /// truncated header or batch, or inconsistent framing.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A fixed capacity would be exceeded: name table, object or batch size.
    #[error("Capacity exceeded: {0}")]
    Capacity(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A cursor access fell outside of its buffer.
    #[error("Out of bounds: {len} bytes at position {pos} exceed buffer of {capacity} bytes")]
    OutOfBounds {
        /// Cursor position of the access.
        pos: usize,
        /// Number of bytes requested.
        len: usize,
        /// Length of the underlying buffer.
        capacity: usize,
    },

    /// The file accepted fewer bytes than were handed to it.
    #[error("Short write at offset {offset}: wrote {written} of {expected} bytes")]
    ShortWrite {
        /// File offset of the write.
        offset: u64,
        /// Number of bytes handed to the file.
        expected: usize,
        /// Number of bytes the file accepted.
        written: usize,
    },

    /// A caller supplied callback failed.
    #[error("Callback failed: {0}")]
    Callback(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new capacity error.
    pub fn capacity(msg: impl Into<String>) -> Self {
        Error::Capacity(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Wraps an error raised inside a caller supplied callback.
    pub fn callback(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Callback(err.into())
    }

    /// Returns true for structural format errors.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::corruption("test corruption");
        assert_eq!(err.to_string(), "Data corruption: test corruption");

        let err = Error::OutOfBounds { pos: 7, len: 4, capacity: 8 };
        assert!(err.to_string().contains("position 7"));

        let err = Error::ShortWrite { offset: 64, expected: 10, written: 3 };
        assert!(err.to_string().contains("wrote 3 of 10"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_corruption());
    }

    #[test]
    fn test_callback_keeps_source() {
        let err = Error::callback("visitor gave up");
        assert!(matches!(err, Error::Callback(_)));
        assert!(std::error::Error::source(&err).is_some());
        assert_eq!(err.to_string(), "Callback failed: visitor gave up");
    }
}
