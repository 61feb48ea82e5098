//! Error types for the data source layer.
//!
//! Every failure a stream can produce is a variant here: resource failures
//! from the backing store, and format failures found while decoding.

use crate::primitive::TypeTag;
use thiserror::Error;

/// Errors that can occur while reading or writing a [`DataSource`].
///
/// [`DataSource`]: crate::DataSource
#[derive(Debug, Error)]
pub enum Error {
    /// The backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended before the requested number of bytes was available.
    #[error("unexpected end of stream at offset {offset}: wanted {wanted} bytes")]
    UnexpectedEof {
        /// Offset at which the read started.
        offset: u64,
        /// Number of bytes requested.
        wanted: usize,
    },

    /// A write was attempted on a read-only source.
    #[error("data source is read-only")]
    ReadOnly,

    /// A write would run past the end of a fixed-size buffer.
    #[error("write of {len} bytes at offset {offset} exceeds buffer of {capacity} bytes")]
    OutOfBounds {
        /// Offset of the write.
        offset: u64,
        /// Length of the write.
        len: usize,
        /// Size of the fixed buffer.
        capacity: usize,
    },

    /// Growing an in-memory buffer failed.
    #[error("could not allocate {requested} more bytes")]
    AllocationFailed {
        /// Bytes the buffer needed to grow by.
        requested: usize,
    },

    /// A seek resolved to a position before the start of the stream.
    #[error("invalid seek to offset {0}")]
    InvalidSeek(i64),

    /// A debug type tag did not match the value being read.
    #[error("type tag mismatch at offset {offset}: expected {expected}, found {found:#04x}")]
    TypeTagMismatch {
        /// Tag the reader asked for.
        expected: TypeTag,
        /// Raw tag byte found in the stream.
        found: u8,
        /// Offset of the tag byte.
        offset: u64,
    },

    /// An encoded string length exceeds the allowed maximum.
    #[error("string of {len} bytes exceeds maximum of {max} bytes")]
    StringTooLong {
        /// Encoded length, terminator included.
        len: u64,
        /// Maximum allowed length.
        max: u32,
    },

    /// An encoded string had a zero length or was missing its terminator.
    #[error("malformed string at offset {offset}")]
    MalformedString {
        /// Offset of the string's length prefix.
        offset: u64,
    },

    /// String bytes were not valid UTF-8.
    #[error("string at offset {offset} is not valid UTF-8")]
    InvalidUtf8 {
        /// Offset of the string's length prefix.
        offset: u64,
    },

    /// The magic field of an archive version record did not match.
    #[error("bad magic: expected \"{expected}\", found \"{found}\"")]
    BadMagic {
        /// Name the reader expected.
        expected: String,
        /// Printable rendition of the magic field that was read.
        found: String,
    },

    /// The archive's major version differs from the reader's.
    #[error("{name}: major version mismatch (expected {expected}, found {found})")]
    MajorMismatch {
        /// Archive name.
        name: String,
        /// Major version the reader supports.
        expected: u32,
        /// Major version found in the stream.
        found: u32,
    },
}

/// Result type for data source operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnexpectedEof {
            offset: 12,
            wanted: 4,
        };
        assert_eq!(
            err.to_string(),
            "unexpected end of stream at offset 12: wanted 4 bytes"
        );

        let err = Error::MajorMismatch {
            name: "scene".to_string(),
            expected: 3,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "scene: major version mismatch (expected 3, found 2)"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
