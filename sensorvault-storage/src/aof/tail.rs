use std::path::Path;

use crate::{
    error::{Result, StorageError},
    format::LOG_HEADER_SIZE,
    mapped::MappedFile,
};

/// Independent read cursor over an append-only log file.
///
/// The reader owns its own read-only mapping and never writes. Each read
/// re-observes the writer's cursor in the header, so new records become
/// readable as soon as the writer publishes them, without locks.
pub struct TailingReader {
    file: MappedFile,
    read_cursor: u64,
}

impl TailingReader {
    /// Open an existing log, mapping the whole file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_file(MappedFile::open_read_only(path, None)?)
    }

    /// Open an existing log, mapping at most `max_size` bytes.
    pub fn open_bounded(path: impl AsRef<Path>, max_size: u64) -> Result<Self> {
        Self::from_file(MappedFile::open_read_only(path, Some(max_size))?)
    }

    fn from_file(file: MappedFile) -> Result<Self> {
        tracing::debug!(path = %file.path().display(), len = file.len(), "tailing reader opened");
        Ok(Self {
            file,
            read_cursor: LOG_HEADER_SIZE,
        })
    }

    /// The writer's cursor as currently published, clamped to the mapping.
    /// An unreadable header counts as an empty log.
    pub fn write_cursor(&self) -> u64 {
        self.file
            .load_u64_acquire(0)
            .map(|cursor| cursor.min(self.file.len()))
            .unwrap_or(LOG_HEADER_SIZE)
    }

    /// Bytes published by the writer that this reader has not consumed yet.
    pub fn available(&self) -> u64 {
        self.write_cursor().saturating_sub(self.read_cursor)
    }

    /// Offset of the next byte this reader will return.
    pub fn position(&self) -> u64 {
        self.read_cursor
    }

    /// Start over from the first record.
    pub fn rewind(&mut self) {
        self.read_cursor = LOG_HEADER_SIZE;
    }

    /// Fill `buf` with the next `buf.len()` bytes and advance.
    ///
    /// Fails with `NotEnoughData`, leaving the cursor untouched, when the
    /// request reaches past the published write cursor or the mapping.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        let len = buf.len() as u64;
        let visible = self.write_cursor();
        match self.read_cursor.checked_add(len) {
            Some(end) if end <= visible && end <= self.file.len() => {
                self.file.read_at(self.read_cursor, buf)?;
                self.read_cursor = end;
                Ok(())
            }
            _ => Err(StorageError::NotEnoughData {
                requested: len,
                available: visible.saturating_sub(self.read_cursor),
            }),
        }
    }
}
