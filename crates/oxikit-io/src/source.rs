//! The [`DataSource`] contract and its typed extension.
//!
//! A data source is a seekable byte stream with a declared byte order. The
//! trait itself is object safe and only moves raw bytes; [`DataSourceExt`]
//! layers typed primitives, debug type tags, absolute-offset access and
//! string encoding on top of it for every source, `dyn DataSource`
//! included.
//!
//! # Example
//!
//! ```rust
//! use oxikit_io::{ByteOrder, DataSource, DataSourceExt, MemorySource};
//!
//! let mut ds = MemorySource::new();
//! ds.set_byte_order(ByteOrder::Little);
//! ds.write_u16(0x0102).unwrap();
//! ds.write_string("hi").unwrap();
//! assert_eq!(&ds.as_bytes()[..2], &[0x02, 0x01]);
//!
//! ds.rewind().unwrap();
//! assert_eq!(ds.read_u16().unwrap(), 0x0102);
//! assert_eq!(ds.read_string().unwrap(), "hi");
//! ```

use crate::error::{Error, Result};
use crate::primitive::{Primitive, TypeTag};
use crate::ByteOrder;
use std::io::SeekFrom;

/// Largest encoded string accepted by [`DataSourceExt::read_string`],
/// NUL terminator included.
pub const STRING_MAX: u32 = 0xffff;

/// Per-stream settings shared by every backing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StreamSettings {
    /// Byte order of multi-byte primitives.
    pub byte_order: ByteOrder,
    /// Whether each typed value is preceded by a one-byte [`TypeTag`].
    pub type_tags: bool,
}

/// A byte stream with read, write, seek and tell.
///
/// Implementations provide raw byte movement; byte order and type tags are
/// handled by [`DataSourceExt`].
pub trait DataSource {
    /// Returns the stream settings.
    fn settings(&self) -> &StreamSettings;

    /// Returns the stream settings for modification.
    fn settings_mut(&mut self) -> &mut StreamSettings;

    /// Reads exactly `buf.len()` bytes at the current position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnexpectedEof`] if the stream ends first, or
    /// [`Error::Io`] if the backing store fails.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Reads exactly `buf.len()` bytes at `offset` without moving the
    /// current position.
    ///
    /// # Errors
    ///
    /// Same as [`DataSource::read_bytes`].
    fn read_bytes_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()>;

    /// Writes all of `buf` at the current position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] for read-only sources,
    /// [`Error::OutOfBounds`] for full fixed buffers, or [`Error::Io`].
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()>;

    /// Writes all of `buf` at `offset` without moving the current position.
    ///
    /// # Errors
    ///
    /// Same as [`DataSource::write_bytes`].
    fn write_bytes_at(&mut self, buf: &[u8], offset: u64) -> Result<()>;

    /// Returns the current position.
    fn tell(&self) -> u64;

    /// Moves the current position.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSeek`] if the target is before the start.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Flushes buffered writes to the backing store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the backing store fails.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns the byte order of this stream.
    fn byte_order(&self) -> ByteOrder {
        self.settings().byte_order
    }

    /// Declares the byte order of this stream.
    fn set_byte_order(&mut self, order: ByteOrder) {
        self.settings_mut().byte_order = order;
    }

    /// Returns whether typed values carry a debug type tag.
    fn type_tags(&self) -> bool {
        self.settings().type_tags
    }

    /// Enables or disables debug type tags.
    ///
    /// Readers must use the same setting the stream was written with.
    fn set_type_tags(&mut self, enabled: bool) {
        self.settings_mut().type_tags = enabled;
    }
}

/// Resolves a [`SeekFrom`] against the current position and stream length.
pub(crate) fn resolve_seek(pos: SeekFrom, current: u64, len: u64) -> Result<u64> {
    let (base, delta) = match pos {
        SeekFrom::Start(offset) => return Ok(offset),
        SeekFrom::Current(delta) => (current, delta),
        SeekFrom::End(delta) => (len, delta),
    };
    base.checked_add_signed(delta).ok_or_else(|| {
        Error::InvalidSeek(i64::try_from(base).unwrap_or(i64::MAX).saturating_add(delta))
    })
}

macro_rules! typed_accessors {
    ($($ty:ty => $read:ident, $write:ident, $read_at:ident, $write_at:ident;)*) => {
        $(
            #[doc = concat!("Reads a `", stringify!($ty), "`.")]
            ///
            /// # Errors
            ///
            /// See [`DataSourceExt::read`].
            fn $read(&mut self) -> Result<$ty> {
                self.read::<$ty>()
            }

            #[doc = concat!("Writes a `", stringify!($ty), "`.")]
            ///
            /// # Errors
            ///
            /// See [`DataSourceExt::write`].
            fn $write(&mut self, value: $ty) -> Result<()> {
                self.write::<$ty>(value)
            }

            #[doc = concat!("Reads a `", stringify!($ty), "` at an absolute offset.")]
            ///
            /// # Errors
            ///
            /// See [`DataSourceExt::read_at`].
            fn $read_at(&mut self, offset: u64) -> Result<$ty> {
                self.read_at::<$ty>(offset)
            }

            #[doc = concat!("Overwrites a `", stringify!($ty), "` at an absolute offset.")]
            ///
            /// # Errors
            ///
            /// See [`DataSourceExt::write_at`].
            fn $write_at(&mut self, value: $ty, offset: u64) -> Result<()> {
                self.write_at::<$ty>(value, offset)
            }
        )*
    };
}

/// Typed operations available on every [`DataSource`].
pub trait DataSourceExt: DataSource {
    /// Reads a primitive, verifying its type tag if tags are enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeTagMismatch`] on a wrong tag, or any error of
    /// [`DataSource::read_bytes`].
    fn read<P: Primitive>(&mut self) -> Result<P> {
        self.expect_tag(P::TAG)?;
        self.read_untagged()
    }

    /// Reads a primitive without a type tag regardless of stream settings.
    ///
    /// # Errors
    ///
    /// Any error of [`DataSource::read_bytes`].
    fn read_untagged<P: Primitive>(&mut self) -> Result<P> {
        let mut bytes = P::Bytes::default();
        self.read_bytes(bytes.as_mut())?;
        Ok(P::from_bytes(bytes, self.byte_order()))
    }

    /// Writes a primitive, preceded by its type tag if tags are enabled.
    ///
    /// # Errors
    ///
    /// Any error of [`DataSource::write_bytes`].
    fn write<P: Primitive>(&mut self, value: P) -> Result<()> {
        if self.type_tags() {
            self.write_bytes(&[P::TAG.as_u8()])?;
        }
        self.write_untagged(value)
    }

    /// Writes a primitive without a type tag regardless of stream settings.
    ///
    /// # Errors
    ///
    /// Any error of [`DataSource::write_bytes`].
    fn write_untagged<P: Primitive>(&mut self, value: P) -> Result<()> {
        let bytes = value.to_bytes(self.byte_order());
        self.write_bytes(bytes.as_ref())
    }

    /// Reads a primitive stored at `offset`, leaving the position alone.
    ///
    /// # Errors
    ///
    /// Same as [`DataSourceExt::read`].
    fn read_at<P: Primitive>(&mut self, offset: u64) -> Result<P> {
        let mut offset = offset;
        if self.type_tags() {
            let mut tag = [0u8; 1];
            self.read_bytes_at(&mut tag, offset)?;
            if tag[0] != P::TAG.as_u8() {
                return Err(Error::TypeTagMismatch {
                    expected: P::TAG,
                    found: tag[0],
                    offset,
                });
            }
            offset += 1;
        }
        let mut bytes = P::Bytes::default();
        self.read_bytes_at(bytes.as_mut(), offset)?;
        Ok(P::from_bytes(bytes, self.byte_order()))
    }

    /// Overwrites a primitive (and its tag) at `offset`, leaving the
    /// position alone.
    ///
    /// Used to patch length fields once the data they describe is written.
    ///
    /// # Errors
    ///
    /// Same as [`DataSourceExt::write`].
    fn write_at<P: Primitive>(&mut self, value: P, offset: u64) -> Result<()> {
        let mut offset = offset;
        if self.type_tags() {
            self.write_bytes_at(&[P::TAG.as_u8()], offset)?;
            offset += 1;
        }
        let bytes = value.to_bytes(self.byte_order());
        self.write_bytes_at(bytes.as_ref(), offset)
    }

    /// Returns the number of bytes a `P` occupies in this stream, tag included.
    fn encoded_len<P: Primitive>(&self) -> u64 {
        let tag = u64::from(self.type_tags());
        tag + P::encoded_len() as u64
    }

    /// Consumes and checks a type tag if tags are enabled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeTagMismatch`] if the tag differs.
    fn expect_tag(&mut self, expected: TypeTag) -> Result<()> {
        if !self.type_tags() {
            return Ok(());
        }
        let offset = self.tell();
        let mut tag = [0u8; 1];
        self.read_bytes(&mut tag)?;
        if tag[0] == expected.as_u8() {
            Ok(())
        } else {
            Err(Error::TypeTagMismatch {
                expected,
                found: tag[0],
                offset,
            })
        }
    }

    typed_accessors! {
        u8 => read_u8, write_u8, read_u8_at, write_u8_at;
        i8 => read_i8, write_i8, read_i8_at, write_i8_at;
        u16 => read_u16, write_u16, read_u16_at, write_u16_at;
        i16 => read_i16, write_i16, read_i16_at, write_i16_at;
        u32 => read_u32, write_u32, read_u32_at, write_u32_at;
        i32 => read_i32, write_i32, read_i32_at, write_i32_at;
        u64 => read_u64, write_u64, read_u64_at, write_u64_at;
        i64 => read_i64, write_i64, read_i64_at, write_i64_at;
        f32 => read_f32, write_f32, read_f32_at, write_f32_at;
        f64 => read_f64, write_f64, read_f64_at, write_f64_at;
        bool => read_bool, write_bool, read_bool_at, write_bool_at;
    }

    /// Reads a string of at most [`STRING_MAX`] encoded bytes.
    ///
    /// # Errors
    ///
    /// See [`DataSourceExt::read_string_max`].
    fn read_string(&mut self) -> Result<String> {
        self.read_string_max(STRING_MAX)
    }

    /// Reads a length-prefixed, NUL-terminated string.
    ///
    /// The `u32` prefix counts the terminator. A prefix above `max` is a
    /// hard failure and nothing past the prefix is consumed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StringTooLong`], [`Error::MalformedString`] for a
    /// zero length or missing terminator, [`Error::InvalidUtf8`], or any
    /// read error.
    fn read_string_max(&mut self, max: u32) -> Result<String> {
        let offset = self.tell();
        self.expect_tag(TypeTag::String)?;
        let len: u32 = self.read_untagged()?;
        if len > max {
            return Err(Error::StringTooLong {
                len: u64::from(len),
                max,
            });
        }
        if len == 0 {
            return Err(Error::MalformedString { offset });
        }
        let mut buf = vec![0u8; len as usize];
        self.read_bytes(&mut buf)?;
        if buf.pop() != Some(0) {
            return Err(Error::MalformedString { offset });
        }
        String::from_utf8(buf).map_err(|_| Error::InvalidUtf8 { offset })
    }

    /// Writes a length-prefixed, NUL-terminated string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StringTooLong`] if the encoding would exceed
    /// [`STRING_MAX`], or any write error.
    fn write_string(&mut self, s: &str) -> Result<()> {
        let len = s.len() as u64 + 1;
        let encoded = u32::try_from(len)
            .ok()
            .filter(|&len| len <= STRING_MAX)
            .ok_or(Error::StringTooLong {
                len,
                max: STRING_MAX,
            })?;
        if self.type_tags() {
            self.write_bytes(&[TypeTag::String.as_u8()])?;
        }
        self.write_untagged(encoded)?;
        self.write_bytes(s.as_bytes())?;
        self.write_bytes(&[0])
    }

    /// Skips over an encoded string without decoding it.
    ///
    /// # Errors
    ///
    /// Same length checks as [`DataSourceExt::read_string`].
    fn skip_string(&mut self) -> Result<()> {
        let offset = self.tell();
        self.expect_tag(TypeTag::String)?;
        let len: u32 = self.read_untagged()?;
        if len > STRING_MAX {
            return Err(Error::StringTooLong {
                len: u64::from(len),
                max: STRING_MAX,
            });
        }
        if len == 0 {
            return Err(Error::MalformedString { offset });
        }
        self.skip(u64::from(len))
    }

    /// Advances the position by `n` bytes.
    ///
    /// # Errors
    ///
    /// Any error of [`DataSource::seek`].
    fn skip(&mut self, n: u64) -> Result<()> {
        let delta = i64::try_from(n).map_err(|_| Error::InvalidSeek(i64::MAX))?;
        self.seek(SeekFrom::Current(delta)).map(|_| ())
    }

    /// Moves the position back to the start of the stream.
    ///
    /// # Errors
    ///
    /// Any error of [`DataSource::seek`].
    fn rewind(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0)).map(|_| ())
    }
}

impl<T: DataSource + ?Sized> DataSourceExt for T {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemorySource;

    #[test]
    fn test_resolve_seek() {
        assert_eq!(resolve_seek(SeekFrom::Start(7), 3, 10).unwrap(), 7);
        assert_eq!(resolve_seek(SeekFrom::Current(-2), 3, 10).unwrap(), 1);
        assert_eq!(resolve_seek(SeekFrom::End(-4), 3, 10).unwrap(), 6);
        assert!(matches!(
            resolve_seek(SeekFrom::Current(-4), 3, 10),
            Err(Error::InvalidSeek(-1))
        ));
    }

    #[test]
    fn test_tagged_write_layout() {
        let mut ds = MemorySource::new();
        ds.set_type_tags(true);
        ds.write_u16(0xabcd).unwrap();
        assert_eq!(ds.as_bytes(), &[TypeTag::U16.as_u8(), 0xab, 0xcd]);
    }

    #[test]
    fn test_tag_mismatch_reported() {
        let mut ds = MemorySource::new();
        ds.set_type_tags(true);
        ds.write_u32(5).unwrap();
        ds.rewind().unwrap();

        let err = ds.read_i32().unwrap_err();
        assert!(matches!(
            err,
            Error::TypeTagMismatch {
                expected: TypeTag::I32,
                found: 0x05,
                offset: 0
            }
        ));
    }

    #[test]
    fn test_write_at_preserves_position() {
        let mut ds = MemorySource::new();
        ds.set_type_tags(true);
        ds.write_u32(0).unwrap();
        ds.write_u8(9).unwrap();
        let end = ds.tell();

        ds.write_u32_at(77, 0).unwrap();
        assert_eq!(ds.tell(), end);
        assert_eq!(ds.read_u32_at(0).unwrap(), 77);

        ds.rewind().unwrap();
        assert_eq!(ds.read_u32().unwrap(), 77);
        assert_eq!(ds.read_u8().unwrap(), 9);
    }

    #[test]
    fn test_string_layout() {
        let mut ds = MemorySource::new();
        ds.write_string("ab").unwrap();
        assert_eq!(ds.as_bytes(), &[0, 0, 0, 3, b'a', b'b', 0]);
    }

    #[test]
    fn test_string_too_long_on_read() {
        let mut ds = MemorySource::new();
        ds.write_u32(STRING_MAX + 1).unwrap();
        ds.write_bytes(&[0u8; 16]).unwrap();
        ds.rewind().unwrap();

        let err = ds.read_string().unwrap_err();
        assert!(matches!(err, Error::StringTooLong { len, max } if len == u64::from(STRING_MAX) + 1 && max == STRING_MAX));
        // Only the prefix was consumed.
        assert_eq!(ds.tell(), 4);
    }

    #[test]
    fn test_string_too_long_on_write() {
        let mut ds = MemorySource::new();
        let long = "x".repeat(STRING_MAX as usize);
        assert!(matches!(
            ds.write_string(&long),
            Err(Error::StringTooLong { .. })
        ));
        assert_eq!(ds.tell(), 0);
    }

    #[test]
    fn test_string_missing_terminator() {
        let mut ds = MemorySource::new();
        ds.write_u32(2).unwrap();
        ds.write_bytes(b"ab").unwrap();
        ds.rewind().unwrap();
        assert!(matches!(
            ds.read_string(),
            Err(Error::MalformedString { offset: 0 })
        ));
    }

    #[test]
    fn test_skip_string() {
        let mut ds = MemorySource::new();
        ds.write_string("skipped").unwrap();
        ds.write_u8(42).unwrap();
        ds.rewind().unwrap();

        ds.skip_string().unwrap();
        assert_eq!(ds.read_u8().unwrap(), 42);
    }

    #[test]
    fn test_dyn_source_typed_access() {
        let mut mem = MemorySource::new();
        let ds: &mut dyn DataSource = &mut mem;
        ds.write_f64(2.5).unwrap();
        ds.write_string("dyn").unwrap();
        ds.rewind().unwrap();
        assert_eq!(ds.read_f64().unwrap(), 2.5);
        assert_eq!(ds.read_string().unwrap(), "dyn");
    }
}
