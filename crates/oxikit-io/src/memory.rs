//! In-memory data sources.
//!
//! - [`MemorySource`]: growable, owns its buffer
//! - [`CoreSource`]: fixed-size writable view of a caller buffer
//! - [`ConstSource`]: fixed-size read-only view of a caller buffer
//!
//! None of these block.

use crate::error::{Error, Result};
use crate::source::{DataSource, StreamSettings, resolve_seek};
use std::io::SeekFrom;

/// Copies `buf.len()` bytes from `data` at `offset`.
fn read_slice(data: &[u8], buf: &mut [u8], offset: u64) -> Result<()> {
    let src = usize::try_from(offset)
        .ok()
        .and_then(|start| data.get(start..start.checked_add(buf.len())?))
        .ok_or(Error::UnexpectedEof {
            offset,
            wanted: buf.len(),
        })?;
    buf.copy_from_slice(src);
    Ok(())
}

/// Largest buffer a [`MemorySource`] grows to.
pub const MEMORY_MAX: usize = u32::MAX as usize;

/// A growable in-memory stream.
///
/// Writes past the end extend the buffer; seeking past the end and then
/// writing zero-fills the gap. The buffer never grows past [`MEMORY_MAX`].
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
    pos: u64,
    settings: StreamSettings,
}

impl MemorySource {
    /// Creates an empty stream.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty stream with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Wraps existing bytes, positioned at the start.
    #[must_use]
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data,
            ..Self::default()
        }
    }

    /// Returns the stream with the given settings applied.
    #[must_use]
    pub fn with_settings(mut self, settings: StreamSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the bytes written so far.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the stream and returns its buffer.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn store(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        let range = usize::try_from(offset)
            .ok()
            .and_then(|start| Some(start..start.checked_add(buf.len())?))
            .filter(|range| range.end <= MEMORY_MAX)
            .ok_or(Error::OutOfBounds {
                offset,
                len: buf.len(),
                capacity: MEMORY_MAX,
            })?;
        if range.end > self.data.len() {
            let additional = range.end - self.data.len();
            self.data
                .try_reserve(additional)
                .map_err(|_| Error::AllocationFailed { requested: additional })?;
            self.data.resize(range.end, 0);
        }
        self.data[range].copy_from_slice(buf);
        Ok(())
    }
}

impl DataSource for MemorySource {
    fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut StreamSettings {
        &mut self.settings
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        read_slice(&self.data, buf, self.pos)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn read_bytes_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        read_slice(&self.data, buf, offset)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.store(buf, self.pos)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn write_bytes_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        self.store(buf, offset)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.pos = resolve_seek(pos, self.pos, self.data.len() as u64)?;
        Ok(self.pos)
    }
}

/// A fixed-size writable view of a caller-provided buffer.
///
/// Writes that would run past the end fail with [`Error::OutOfBounds`]
/// and leave the buffer untouched.
#[derive(Debug)]
pub struct CoreSource<'a> {
    data: &'a mut [u8],
    pos: u64,
    settings: StreamSettings,
}

impl<'a> CoreSource<'a> {
    /// Wraps a mutable buffer, positioned at the start.
    pub fn new(data: &'a mut [u8]) -> Self {
        Self {
            data,
            pos: 0,
            settings: StreamSettings::default(),
        }
    }

    /// Returns the whole underlying buffer.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.data
    }

    fn store(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        let capacity = self.data.len();
        let oob = Error::OutOfBounds {
            offset,
            len: buf.len(),
            capacity,
        };
        let Ok(start) = usize::try_from(offset) else {
            return Err(oob);
        };
        match start
            .checked_add(buf.len())
            .and_then(|end| self.data.get_mut(start..end))
        {
            Some(dst) => {
                dst.copy_from_slice(buf);
                Ok(())
            }
            None => Err(oob),
        }
    }
}

impl DataSource for CoreSource<'_> {
    fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut StreamSettings {
        &mut self.settings
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        read_slice(self.data, buf, self.pos)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn read_bytes_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        read_slice(self.data, buf, offset)
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.store(buf, self.pos)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn write_bytes_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        self.store(buf, offset)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.pos = resolve_seek(pos, self.pos, self.data.len() as u64)?;
        Ok(self.pos)
    }
}

/// A fixed-size read-only view of a caller-provided buffer.
#[derive(Debug, Clone)]
pub struct ConstSource<'a> {
    data: &'a [u8],
    pos: u64,
    settings: StreamSettings,
}

impl<'a> ConstSource<'a> {
    /// Wraps a byte slice, positioned at the start.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            settings: StreamSettings::default(),
        }
    }

    /// Returns the stream with the given settings applied.
    #[must_use]
    pub fn with_settings(mut self, settings: StreamSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Returns the number of bytes left after the current position.
    #[must_use]
    pub fn remaining(&self) -> usize {
        let pos = usize::try_from(self.pos).unwrap_or(usize::MAX);
        self.data.len().saturating_sub(pos)
    }
}

impl DataSource for ConstSource<'_> {
    fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut StreamSettings {
        &mut self.settings
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        read_slice(self.data, buf, self.pos)?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn read_bytes_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        read_slice(self.data, buf, offset)
    }

    fn write_bytes(&mut self, _buf: &[u8]) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn write_bytes_at(&mut self, _buf: &[u8], _offset: u64) -> Result<()> {
        Err(Error::ReadOnly)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.pos = resolve_seek(pos, self.pos, self.data.len() as u64)?;
        Ok(self.pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataSourceExt;

    #[test]
    fn test_memory_source_grows() {
        let mut ds = MemorySource::new();
        ds.seek(SeekFrom::Start(4)).unwrap();
        ds.write_u8(0xff).unwrap();
        assert_eq!(ds.as_bytes(), &[0, 0, 0, 0, 0xff]);
    }

    #[test]
    fn test_memory_source_refuses_huge_gap() {
        let mut ds = MemorySource::new();
        let err = ds.write_u8_at(1, 1 << 46).unwrap_err();
        assert!(matches!(err, Error::OutOfBounds { capacity: MEMORY_MAX, .. }));
        assert!(ds.as_bytes().is_empty());

        ds.seek(SeekFrom::Start(1 << 40)).unwrap();
        assert!(matches!(ds.write_u32(7), Err(Error::OutOfBounds { .. })));
    }

    #[test]
    fn test_memory_source_eof() {
        let mut ds = MemorySource::from_vec(vec![1, 2, 3]);
        let err = ds.read_u32().unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedEof {
                offset: 0,
                wanted: 4
            }
        ));
        assert_eq!(ds.tell(), 0);
    }

    #[test]
    fn test_core_source_bounds() {
        let mut buf = [0u8; 6];
        let mut ds = CoreSource::new(&mut buf);
        ds.write_u32(0x0102_0304).unwrap();

        let err = ds.write_u32(5).unwrap_err();
        assert!(matches!(
            err,
            Error::OutOfBounds {
                offset: 4,
                len: 4,
                capacity: 6
            }
        ));
        assert_eq!(ds.tell(), 4);
        assert_eq!(ds.as_bytes(), &[1, 2, 3, 4, 0, 0]);
    }

    #[test]
    fn test_const_source_is_read_only() {
        let bytes = [0u8, 0, 0, 9];
        let mut ds = ConstSource::new(&bytes);
        assert!(matches!(ds.write_u8(1), Err(Error::ReadOnly)));
        assert!(matches!(ds.write_u8_at(1, 0), Err(Error::ReadOnly)));
        assert_eq!(ds.read_u32().unwrap(), 9);
        assert_eq!(ds.remaining(), 0);
    }

    #[test]
    fn test_seek_from_end() {
        let bytes = [1u8, 2, 3, 4];
        let mut ds = ConstSource::new(&bytes);
        assert_eq!(ds.seek(SeekFrom::End(-1)).unwrap(), 3);
        assert_eq!(ds.read_u8().unwrap(), 4);
    }
}
