use std::{cell::Cell, marker::PhantomData, path::Path};

use crate::{
    error::{Result, StorageError},
    format::LOG_HEADER_SIZE,
    mapped::{MappedFile, OpenMode},
};

/// Bump-pointer writer over a fixed-size mapped file.
///
/// Single writer: mutation goes through `&mut self`, the handle is neither
/// `Clone` nor `Sync`, and the underlying file carries an exclusive writer lock.
pub struct AppendOnlyLog {
    file: MappedFile,
    write_cursor: u64,
    _not_sync: PhantomData<Cell<()>>,
}

impl AppendOnlyLog {
    /// Open or create the log at `path`, sized to exactly `max_size` bytes.
    ///
    /// A header cursor outside `[8, max_size)` is reset to 8: the file
    /// restarts as logically empty and any bytes past the cursor stay unread.
    pub fn open(path: impl AsRef<Path>, max_size: u64) -> Result<Self> {
        if max_size < LOG_HEADER_SIZE {
            return Err(StorageError::CapacityTooSmall {
                required: LOG_HEADER_SIZE,
                max_size,
            });
        }
        let mut file = MappedFile::open(path, max_size, OpenMode::ReadWrite)?;
        let stored = file.load_u64_acquire(0)?;
        let write_cursor = if (LOG_HEADER_SIZE..max_size).contains(&stored) {
            stored
        } else {
            if stored == 0 {
                tracing::debug!(path = %file.path().display(), "initialising empty append log");
            } else {
                tracing::warn!(
                    path = %file.path().display(),
                    stored,
                    max_size,
                    "write cursor out of range, treating log as empty"
                );
            }
            file.store_u64_release(0, LOG_HEADER_SIZE)?;
            LOG_HEADER_SIZE
        };
        tracing::debug!(path = %file.path().display(), write_cursor, "append log opened");
        Ok(Self {
            file,
            write_cursor,
            _not_sync: PhantomData,
        })
    }

    /// Append `data` and return the file offset it was written at.
    ///
    /// Fails with `LogFull` when the record does not fit before `max_size`;
    /// nothing is written in that case.
    pub fn append(&mut self, data: &[u8]) -> Result<u64> {
        let len = data.len() as u64;
        let offset = self.write_cursor;
        let end = match offset.checked_add(len) {
            Some(end) if end <= self.file.len() => end,
            _ => {
                return Err(StorageError::LogFull {
                    requested: len,
                    remaining: self.remaining(),
                });
            }
        };
        // Payload first, cursor second: a crash in between leaves the bytes
        // invisible rather than the cursor pointing at garbage.
        self.file.write_at(offset, data)?;
        self.file.store_u64_release(0, end)?;
        self.write_cursor = end;
        tracing::trace!(offset, len, "record appended");
        Ok(offset)
    }

    /// Offset of the next byte to be written.
    pub fn write_cursor(&self) -> u64 {
        self.write_cursor
    }

    /// Total file size including the header.
    pub fn capacity(&self) -> u64 {
        self.file.len()
    }

    pub fn remaining(&self) -> u64 {
        self.file.len() - self.write_cursor
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Force appended bytes and the cursor to the backing file.
    pub fn flush(&self) -> Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::aof::TailingReader;

    #[test]
    fn test_fresh_log_starts_after_header() {
        let tmp = TempDir::new().expect("tempdir");
        let log = AppendOnlyLog::open(tmp.path().join("a.log"), 1024).expect("failed_to_unwrap_value");
        assert_eq!(log.write_cursor(), 8);
        assert_eq!(log.capacity(), 1024);
        assert_eq!(log.remaining(), 1016);
    }

    #[test]
    fn test_append_advances_cursor_and_header() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("a.log");
        let mut log = AppendOnlyLog::open(&path, 1024).expect("failed_to_unwrap_value");
        assert_eq!(log.append(b"hello").expect("failed_to_unwrap_value"), 8);
        assert_eq!(log.append(b"world!").expect("failed_to_unwrap_value"), 13);
        assert_eq!(log.write_cursor(), 19);
        log.flush().expect("failed_to_unwrap_value");

        let raw = std::fs::read(&path).expect("failed_to_unwrap_value");
        assert_eq!(&raw[0..8], &19u64.to_le_bytes());
        assert_eq!(&raw[8..19], b"helloworld!");
    }

    #[test]
    fn test_log_full_scenario() {
        let tmp = TempDir::new().expect("tempdir");
        let mut log = AppendOnlyLog::open(tmp.path().join("small.log"), 64).expect("failed_to_unwrap_value");
        for _ in 0..3 {
            log.append(&[0xAB; 8]).expect("failed_to_unwrap_value");
        }
        assert_eq!(log.write_cursor(), 32);
        let err = log.append(&[0xCD; 40]).unwrap_err();
        assert!(matches!(err, StorageError::LogFull { requested: 40, remaining: 32 }));
        // failed append leaves the cursor untouched
        assert_eq!(log.write_cursor(), 32);
        // but the exact remainder still fits
        log.append(&[0xCD; 32]).expect("failed_to_unwrap_value");
        assert_eq!(log.remaining(), 0);
    }

    #[test]
    fn test_reopen_resumes_at_stored_cursor() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("a.log");
        {
            let mut log = AppendOnlyLog::open(&path, 256).expect("failed_to_unwrap_value");
            log.append(&[1, 2, 3, 4]).expect("failed_to_unwrap_value");
            log.flush().expect("failed_to_unwrap_value");
        }
        let mut log = AppendOnlyLog::open(&path, 256).expect("failed_to_unwrap_value");
        assert_eq!(log.write_cursor(), 12);
        log.append(&[5, 6]).expect("failed_to_unwrap_value");
        drop(log);

        let mut reader = TailingReader::open(&path).expect("failed_to_unwrap_value");
        let mut buf = [0u8; 6];
        reader.read(&mut buf).expect("failed_to_unwrap_value");
        assert_eq!(buf, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_corrupt_cursor_resets_to_empty() {
        let tmp = TempDir::new().expect("tempdir");
        let path = tmp.path().join("corrupt.log");
        let mut raw = vec![0u8; 128];
        raw[0..8].copy_from_slice(&999u64.to_le_bytes());
        raw[8..12].copy_from_slice(b"old!");
        std::fs::write(&path, &raw).expect("failed_to_unwrap_value");

        let mut log = AppendOnlyLog::open(&path, 128).expect("failed_to_unwrap_value");
        assert_eq!(log.write_cursor(), 8);
        log.append(b"new").expect("failed_to_unwrap_value");
        drop(log);

        let raw = std::fs::read(&path).expect("failed_to_unwrap_value");
        assert_eq!(&raw[0..8], &11u64.to_le_bytes());
        assert_eq!(&raw[8..11], b"new");
        // stale byte past the cursor is left alone
        assert_eq!(raw[11], b'!');
    }

    #[test]
    fn test_capacity_smaller_than_header() {
        let tmp = TempDir::new().expect("tempdir");
        let err = AppendOnlyLog::open(tmp.path().join("tiny.log"), 4).err().expect("must fail");
        assert!(matches!(err, StorageError::CapacityTooSmall { required: 8, max_size: 4 }));
    }
}
