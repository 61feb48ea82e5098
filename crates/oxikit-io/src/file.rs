//! File-backed data source.

use crate::error::{Error, Result};
use crate::source::{DataSource, StreamSettings};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::warn;

/// Read-ahead and write-behind buffer size.
pub const FILE_BUFFER: usize = 8 * 1024;

/// A data source backed by a file on disk.
///
/// Sequential reads are served from a read-ahead buffer and sequential
/// writes collect in a write-behind buffer of [`FILE_BUFFER`] bytes.
/// Seeking, absolute-offset access and [`DataSource::flush`] drain the
/// pending writes first. Absolute writes that land entirely inside the
/// pending bytes patch them in place. Pending writes are flushed on drop;
/// call `flush` to observe the error.
#[derive(Debug)]
pub struct FileSource {
    file: File,
    /// Logical stream position.
    pos: u64,
    writable: bool,
    settings: StreamSettings,
    /// Bytes for `[pos - pending.len(), pos)` not yet written.
    pending: Vec<u8>,
    /// Read-ahead; the file cursor sits at `pos + (ahead.len() - consumed)`.
    ahead: Vec<u8>,
    consumed: usize,
}

impl FileSource {
    /// Opens an existing file for reading.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_file(file, false))
    }

    /// Creates (or truncates) a file for reading and writing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be created.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::from_file(file, true))
    }

    /// Opens an existing file for reading and writing without truncating.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened.
    pub fn open_rw(path: impl AsRef<Path>) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::from_file(file, true))
    }

    fn from_file(file: File, writable: bool) -> Self {
        Self {
            file,
            pos: 0,
            writable,
            settings: StreamSettings::default(),
            pending: Vec::new(),
            ahead: Vec::new(),
            consumed: 0,
        }
    }

    /// Returns the stream with the given settings applied.
    #[must_use]
    pub fn with_settings(mut self, settings: StreamSettings) -> Self {
        self.settings = settings;
        self
    }

    fn write_pending(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let result = self.file.write_all(&self.pending);
        self.pending.clear();
        Ok(result?)
    }

    fn drop_read_ahead(&mut self) -> Result<()> {
        if self.consumed < self.ahead.len() {
            self.file.seek(SeekFrom::Start(self.pos))?;
        }
        self.ahead.clear();
        self.consumed = 0;
        Ok(())
    }

    /// Drains both buffers so the file cursor matches `pos`.
    fn sync(&mut self) -> Result<()> {
        self.write_pending()?;
        self.drop_read_ahead()
    }

    /// Patches `buf` into the pending bytes if it fits there entirely.
    fn patch_pending(&mut self, buf: &[u8], offset: u64) -> bool {
        let start = self.pos - self.pending.len() as u64;
        let fits = offset >= start
            && offset
                .checked_add(buf.len() as u64)
                .is_some_and(|end| end <= self.pos);
        if fits {
            let at = (offset - start) as usize;
            self.pending[at..at + buf.len()].copy_from_slice(buf);
        }
        fits
    }

    fn check_writable(&self) -> Result<()> {
        if self.writable {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }
}

impl DataSource for FileSource {
    fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    fn settings_mut(&mut self) -> &mut StreamSettings {
        &mut self.settings
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.write_pending()?;
        let offset = self.pos;
        if buf.len() > self.ahead.len() - self.consumed {
            self.ahead.drain(..self.consumed);
            self.consumed = 0;
            let want = buf.len().max(FILE_BUFFER) - self.ahead.len();
            (&mut self.file)
                .take(want as u64)
                .read_to_end(&mut self.ahead)?;
        }
        let end = self.consumed + buf.len();
        let Some(bytes) = self.ahead.get(self.consumed..end) else {
            return Err(Error::UnexpectedEof {
                offset,
                wanted: buf.len(),
            });
        };
        buf.copy_from_slice(bytes);
        self.consumed = end;
        self.pos += buf.len() as u64;
        Ok(())
    }

    fn read_bytes_at(&mut self, buf: &mut [u8], offset: u64) -> Result<()> {
        self.sync()?;
        self.file.seek(SeekFrom::Start(offset))?;
        let result = self.file.read_exact(buf);
        self.file.seek(SeekFrom::Start(self.pos))?;
        result.map_err(|err| match err.kind() {
            ErrorKind::UnexpectedEof => Error::UnexpectedEof {
                offset,
                wanted: buf.len(),
            },
            _ => Error::Io(err),
        })
    }

    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.drop_read_ahead()?;
        self.pending.extend_from_slice(buf);
        self.pos += buf.len() as u64;
        if self.pending.len() >= FILE_BUFFER {
            self.write_pending()?;
        }
        Ok(())
    }

    fn write_bytes_at(&mut self, buf: &[u8], offset: u64) -> Result<()> {
        self.check_writable()?;
        if self.patch_pending(buf, offset) {
            return Ok(());
        }
        self.sync()?;
        self.file.seek(SeekFrom::Start(offset))?;
        let result = self.file.write_all(buf);
        self.file.seek(SeekFrom::Start(self.pos))?;
        Ok(result?)
    }

    fn tell(&self) -> u64 {
        self.pos
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Current(delta) => {
                let base = self.pos;
                let target = base
                    .checked_add_signed(delta)
                    .ok_or(Error::InvalidSeek(delta))?;
                SeekFrom::Start(target)
            }
            other => other,
        };
        self.sync()?;
        self.pos = self.file.seek(target)?;
        Ok(self.pos)
    }

    fn flush(&mut self) -> Result<()> {
        self.write_pending()?;
        self.file.flush()?;
        Ok(())
    }
}

impl Drop for FileSource {
    fn drop(&mut self) {
        if let Err(err) = self.write_pending() {
            warn!(%err, "dropping file source with unwritten bytes");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DataSourceExt;

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");

        {
            let mut ds = FileSource::create(&path).unwrap();
            ds.write_u32(0).unwrap();
            ds.write_string("file").unwrap();
            ds.write_u32_at(0xcafe, 0).unwrap();
            ds.flush().unwrap();
        }

        let mut ds = FileSource::open(&path).unwrap();
        assert_eq!(ds.read_u32().unwrap(), 0xcafe);
        assert_eq!(ds.read_string().unwrap(), "file");
        assert!(matches!(ds.read_u8(), Err(Error::UnexpectedEof { .. })));
    }

    #[test]
    fn test_read_only_file_rejects_writes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut ds = FileSource::open(file.path()).unwrap();
        assert!(matches!(ds.write_u8(1), Err(Error::ReadOnly)));
    }

    #[test]
    fn test_read_at_keeps_position() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut ds = FileSource::open_rw(file.path()).unwrap();
        ds.write_u16(1).unwrap();
        ds.write_u16(2).unwrap();
        assert_eq!(ds.read_u16_at(2).unwrap(), 2);
        assert_eq!(ds.tell(), 4);
    }

    #[test]
    fn test_buffered_writes_and_patches() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let count = FILE_BUFFER + 100;
        {
            let mut ds = FileSource::create(file.path()).unwrap();
            ds.write_u32(0).unwrap();
            for i in 0..count {
                ds.write_u8(i as u8).unwrap();
            }
            // One patch lands in the pending tail, one in the drained region.
            ds.write_u8_at(0xee, 4 + count as u64 - 1).unwrap();
            ds.write_u32_at(count as u32, 0).unwrap();
            assert_eq!(ds.read_u8_at(4 + count as u64 - 1).unwrap(), 0xee);
            assert_eq!(ds.tell(), 4 + count as u64);
        }

        let mut ds = FileSource::open(file.path()).unwrap();
        assert_eq!(ds.read_u32().unwrap(), count as u32);
        for i in 0..count - 1 {
            assert_eq!(ds.read_u8().unwrap(), i as u8);
        }
        assert_eq!(ds.read_u8().unwrap(), 0xee);
        assert!(matches!(ds.read_u8(), Err(Error::UnexpectedEof { .. })));
    }

    #[test]
    fn test_write_after_read_ahead() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), [1, 2, 3, 4]).unwrap();

        let mut ds = FileSource::open_rw(file.path()).unwrap();
        assert_eq!(ds.read_u8().unwrap(), 1);
        ds.write_u8(9).unwrap();
        assert_eq!(ds.read_u8().unwrap(), 3);
        assert!(matches!(ds.read_u16(), Err(Error::UnexpectedEof { offset: 3, .. })));
        assert_eq!(ds.tell(), 3);
        assert_eq!(ds.read_u8().unwrap(), 4);
        ds.flush().unwrap();
        assert_eq!(std::fs::read(file.path()).unwrap(), [1, 9, 3, 4]);
    }
}
