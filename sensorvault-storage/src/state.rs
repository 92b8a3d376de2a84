//! Fixed-size raw state blob.
//!
//! No header, no cursor: the caller owns the layout and overwrites whole
//! snapshots in place.

use std::path::Path;

use crate::{
    error::Result,
    mapped::{MappedFile, OpenMode},
};

pub struct StateStore {
    file: MappedFile,
}

impl StateStore {
    /// Open or create a writable store of exactly `max_size` bytes.
    pub fn open(path: impl AsRef<Path>, max_size: u64) -> Result<Self> {
        Self::open_with_mode(path, max_size, OpenMode::ReadWrite)
    }

    pub fn open_with_mode(path: impl AsRef<Path>, max_size: u64, mode: OpenMode) -> Result<Self> {
        let file = MappedFile::open(path, max_size, mode)?;
        tracing::debug!(path = %file.path().display(), len = file.len(), ?mode, "state store opened");
        Ok(Self { file })
    }

    /// Copy `data` into the store at `offset`. Fails with `OutOfRange` if the
    /// range does not fit.
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.write_at(offset, data)
    }

    /// Fill `buf` from the store at `offset`. Fails with `OutOfRange` if the
    /// range does not fit.
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.read_at(offset, buf)
    }

    pub fn capacity(&self) -> u64 {
        self.file.len()
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn flush(&self) -> Result<()> {
        self.file.flush()
    }
}
