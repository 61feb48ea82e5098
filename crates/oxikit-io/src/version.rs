//! Archive version records.
//!
//! A version record opens every archive: a fixed-width magic field holding
//! the archive name, then the major and minor version as `u32`.
//!
//! The magic field is first filled with a repeating 4-byte pattern and the
//! name is then laid over it, NUL-terminated when it fits. A truncated name
//! therefore still compares equal, and the filler makes a short or damaged
//! field easy to spot in a hex dump.
//!
//! Reading enforces the major version strictly. A differing minor version
//! is logged and accepted, so newer writers stay readable by older readers
//! of the same major line.

use crate::error::{Error, Result};
use crate::source::{DataSource, DataSourceExt};
use std::fmt;
use tracing::warn;

/// Width of the magic field in bytes.
pub const MAGIC_LEN: usize = 32;

/// Pattern repeated under the name in the magic field.
const MAGIC_FILLER: [u8; 4] = *b"!ox!";

/// A major/minor version pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ArchiveVersion {
    /// Incremented for incompatible format changes.
    pub major: u32,
    /// Incremented for compatible additions.
    pub minor: u32,
}

/// How a version read from a stream relates to the expected one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compat {
    /// Major and minor both match.
    Exact,
    /// Same major version, different minor version.
    MinorMismatch,
    /// Different major version.
    Incompatible,
}

impl ArchiveVersion {
    /// Creates a version.
    #[must_use]
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Compares `self` (as read from a stream) against `expected`.
    #[must_use]
    pub fn compat(self, expected: ArchiveVersion) -> Compat {
        if self.major != expected.major {
            Compat::Incompatible
        } else if self.minor != expected.minor {
            Compat::MinorMismatch
        } else {
            Compat::Exact
        }
    }
}

impl fmt::Display for ArchiveVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Builds the magic field for `name`.
///
/// Names longer than [`MAGIC_LEN`] are truncated.
///
/// # Example
///
/// ```rust
/// use oxikit_io::version::{MAGIC_LEN, encode_magic};
///
/// let field = encode_magic("scene");
/// assert_eq!(&field[..6], b"scene\0");
/// assert_eq!(&field[8..12], b"!ox!");
/// assert_eq!(field.len(), MAGIC_LEN);
/// ```
#[must_use]
pub fn encode_magic(name: &str) -> [u8; MAGIC_LEN] {
    let mut field = [0u8; MAGIC_LEN];
    for (i, byte) in field.iter_mut().enumerate() {
        *byte = MAGIC_FILLER[i % MAGIC_FILLER.len()];
    }
    let name = name.as_bytes();
    let n = name.len().min(MAGIC_LEN);
    field[..n].copy_from_slice(&name[..n]);
    if n < MAGIC_LEN {
        field[n] = 0;
    }
    field
}

/// Extracts the printable name from a magic field.
#[must_use]
pub fn decode_magic(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Writes a version record.
///
/// # Errors
///
/// Any write error of the underlying source.
pub fn write_version<D: DataSource + ?Sized>(
    ds: &mut D,
    name: &str,
    version: ArchiveVersion,
) -> Result<()> {
    ds.write_bytes(&encode_magic(name))?;
    ds.write_u32(version.major)?;
    ds.write_u32(version.minor)
}

/// Reads a version record and checks it against `expected_name` and
/// `expected`.
///
/// Returns the version found in the stream. A minor mismatch is logged at
/// warn level and is not an error; callers that care can inspect
/// [`ArchiveVersion::compat`].
///
/// # Errors
///
/// Returns [`Error::BadMagic`] if the magic field differs,
/// [`Error::MajorMismatch`] if the major versions differ, or any read
/// error.
pub fn read_version<D: DataSource + ?Sized>(
    ds: &mut D,
    expected_name: &str,
    expected: ArchiveVersion,
) -> Result<ArchiveVersion> {
    let mut field = [0u8; MAGIC_LEN];
    ds.read_bytes(&mut field)?;
    if field != encode_magic(expected_name) {
        return Err(Error::BadMagic {
            expected: expected_name.to_string(),
            found: decode_magic(&field),
        });
    }

    let found = ArchiveVersion::new(ds.read_u32()?, ds.read_u32()?);
    match found.compat(expected) {
        Compat::Exact => {}
        Compat::MinorMismatch => {
            warn!(
                name = expected_name,
                expected = %expected,
                found = %found,
                "archive minor version differs"
            );
        }
        Compat::Incompatible => {
            return Err(Error::MajorMismatch {
                name: expected_name.to_string(),
                expected: expected.major,
                found: found.major,
            });
        }
    }
    Ok(found)
}

/// Reads a version record without checking it.
///
/// Returns the decoded name and the version.
///
/// # Errors
///
/// Any read error.
pub fn read_version_header<D: DataSource + ?Sized>(
    ds: &mut D,
) -> Result<(String, ArchiveVersion)> {
    let mut field = [0u8; MAGIC_LEN];
    ds.read_bytes(&mut field)?;
    let version = ArchiveVersion::new(ds.read_u32()?, ds.read_u32()?);
    Ok((decode_magic(&field), version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySource;

    fn written(name: &str, version: ArchiveVersion) -> MemorySource {
        let mut ds = MemorySource::new();
        write_version(&mut ds, name, version).unwrap();
        ds.rewind().unwrap();
        ds
    }

    #[test]
    fn test_magic_padding() {
        let field = encode_magic("ab");
        assert_eq!(&field[..4], b"ab\0!");
        assert_eq!(&field[4..8], b"!ox!");
    }

    #[test]
    fn test_magic_truncation() {
        let long = "n".repeat(MAGIC_LEN + 10);
        let field = encode_magic(&long);
        assert!(field.iter().all(|&b| b == b'n'));
        assert_eq!(encode_magic(&long), encode_magic(&long[..MAGIC_LEN]));
    }

    #[test]
    fn test_record_layout() {
        let ds = written("v", ArchiveVersion::new(1, 2));
        let bytes = ds.as_bytes();
        assert_eq!(bytes.len(), MAGIC_LEN + 8);
        assert_eq!(&bytes[MAGIC_LEN..], &[0, 0, 0, 1, 0, 0, 0, 2]);
    }

    #[test]
    fn test_exact_version() {
        let mut ds = written("scene", ArchiveVersion::new(2, 3));
        let found = read_version(&mut ds, "scene", ArchiveVersion::new(2, 3)).unwrap();
        assert_eq!(found, ArchiveVersion::new(2, 3));
    }

    #[test]
    fn test_minor_mismatch_is_accepted() {
        let mut ds = written("scene", ArchiveVersion::new(2, 0));
        let found = read_version(&mut ds, "scene", ArchiveVersion::new(2, 3)).unwrap();
        assert_eq!(found, ArchiveVersion::new(2, 0));
        assert_eq!(
            found.compat(ArchiveVersion::new(2, 3)),
            Compat::MinorMismatch
        );
    }

    #[test]
    fn test_major_mismatch_fails() {
        let mut ds = written("scene", ArchiveVersion::new(2, 0));
        let err = read_version(&mut ds, "scene", ArchiveVersion::new(3, 0)).unwrap_err();
        assert!(matches!(
            err,
            Error::MajorMismatch {
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut ds = written("scene", ArchiveVersion::new(1, 0));
        let err = read_version(&mut ds, "sprite", ArchiveVersion::new(1, 0)).unwrap_err();
        match err {
            Error::BadMagic { expected, found } => {
                assert_eq!(expected, "sprite");
                assert_eq!(found, "scene");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_read_header() {
        let mut ds = written("anything", ArchiveVersion::new(4, 1));
        let (name, version) = read_version_header(&mut ds).unwrap();
        assert_eq!(name, "anything");
        assert_eq!(version, ArchiveVersion::new(4, 1));
    }
}
