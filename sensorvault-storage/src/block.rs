//! Block table: bump-pointer block allocator indexed by a fixed-capacity
//! table of contents.
//!
//! ```text
//! [0:8)                 block count (u64 LE)
//! [8:16)                append cursor (u64 LE)
//! [16:32)               reserved
//! [32:toc_end)          TOC, max_block_count x 32-byte TocEntry
//! [toc_end:max_size)    data region, blocks 32-byte aligned
//! ```
//!
//! Blocks are never freed or resized. The in-memory index is rebuilt from the
//! TOC on every open.

use std::{cell::Cell, collections::HashMap, marker::PhantomData, path::Path};

use sensorvault_core::{BlockId, size::align_up};

use crate::{
    error::{Result, StorageError},
    format::{
        APPEND_CURSOR_OFFSET, BLOCK_ALIGNMENT, BLOCK_COUNT_OFFSET, BLOCK_LOG_HEADER_SIZE, DEFAULT_BLOCK_HEADER_SIZE,
        DEFAULT_MAX_BLOCK_COUNT, TOC_ENTRY_SIZE, TocEntry,
    },
    mapped::{MappedFile, OpenMode},
};

/// Geometry of a block table file. Must match between opens of one file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockTableConfig {
    /// Number of TOC entries.
    pub max_block_count: u64,
    /// Bytes reserved per block on top of its declared size.
    pub block_header_size: u64,
}

impl Default for BlockTableConfig {
    fn default() -> Self {
        Self {
            max_block_count: DEFAULT_MAX_BLOCK_COUNT,
            block_header_size: DEFAULT_BLOCK_HEADER_SIZE,
        }
    }
}

impl BlockTableConfig {
    pub fn with_max_block_count(mut self, max_block_count: u64) -> Self {
        self.max_block_count = max_block_count;
        self
    }

    /// First byte of the data region. Saturates at `u64::MAX` for a TOC no
    /// file can hold, which `BlockTableLog::open_with` rejects.
    pub fn toc_end(&self) -> u64 {
        self.toc_offset(self.max_block_count)
    }

    fn toc_offset(&self, slot: u64) -> u64 {
        slot.saturating_mul(TOC_ENTRY_SIZE).saturating_add(BLOCK_LOG_HEADER_SIZE)
    }
}

/// Location and declared capacity of one allocated block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub offset: u64,
    pub size: u64,
}

/// Single-writer block allocator over one mapped file.
pub struct BlockTableLog {
    file: MappedFile,
    config: BlockTableConfig,
    block_count: u64,
    append_cursor: u64,
    index: HashMap<BlockId, BlockInfo>,
    _not_sync: PhantomData<Cell<()>>,
}

impl BlockTableLog {
    /// Open or create a writable block table with the default geometry.
    pub fn open(path: impl AsRef<Path>, max_size: u64) -> Result<Self> {
        Self::open_with(path, max_size, BlockTableConfig::default(), OpenMode::ReadWrite)
    }

    /// Open a block table and rebuild its index from the TOC.
    ///
    /// A header whose block count is outside `[0, max_block_count)` or whose
    /// append cursor is implausible resets the table to empty. TOC entries
    /// pointing outside the data region are skipped: their slot still counts
    /// toward `block_count`, but the id is absent from the index.
    ///
    /// Fails with `CapacityTooSmall` when the TOC for `max_block_count`
    /// entries does not fit in `max_size`.
    pub fn open_with(path: impl AsRef<Path>, max_size: u64, config: BlockTableConfig, mode: OpenMode) -> Result<Self> {
        let toc_end = config.toc_end();
        if max_size < toc_end {
            return Err(StorageError::CapacityTooSmall {
                required: toc_end,
                max_size,
            });
        }
        let file = MappedFile::open(path, max_size, mode)?;
        if file.len() < toc_end {
            return Err(StorageError::CapacityTooSmall {
                required: toc_end,
                max_size: file.len(),
            });
        }
        let mut log = Self {
            file,
            config,
            block_count: 0,
            append_cursor: toc_end,
            index: HashMap::new(),
            _not_sync: PhantomData,
        };
        log.recover()?;
        Ok(log)
    }

    fn recover(&mut self) -> Result<()> {
        let toc_end = self.config.toc_end();
        let stored_count = self.file.load_u64_acquire(BLOCK_COUNT_OFFSET)?;
        let stored_cursor = self.file.read_u64(APPEND_CURSOR_OFFSET)?;
        let plausible = stored_count < self.config.max_block_count
            && (toc_end..=self.file.len()).contains(&stored_cursor)
            && stored_cursor % BLOCK_ALIGNMENT == 0;

        if !plausible {
            if stored_count == 0 && stored_cursor == 0 {
                tracing::debug!(path = %self.file.path().display(), "initialising empty block table");
            } else {
                tracing::warn!(
                    path = %self.file.path().display(),
                    stored_count,
                    stored_cursor,
                    max_block_count = self.config.max_block_count,
                    "block table header out of range, treating table as empty"
                );
            }
            self.block_count = 0;
            self.append_cursor = toc_end;
            if self.file.mode() == OpenMode::ReadWrite {
                self.persist_header()?;
            }
            return Ok(());
        }

        self.block_count = stored_count;
        self.append_cursor = stored_cursor;
        for slot in 0..stored_count {
            let entry = TocEntry::decode(self.file.bytes(self.config.toc_offset(slot), TOC_ENTRY_SIZE as usize)?);
            let in_bounds = entry.offset() >= toc_end
                && entry.offset().checked_add(entry.size()).is_some_and(|end| end <= self.file.len());
            if !in_bounds {
                tracing::warn!(slot, id = ?entry.id, offset = entry.offset(), size = entry.size(), "skipping out-of-bounds TOC entry");
                continue;
            }
            self.index.insert(entry.id, BlockInfo {
                offset: entry.offset(),
                size: entry.size(),
            });
        }
        tracing::debug!(
            path = %self.file.path().display(),
            blocks = self.block_count,
            append_cursor = self.append_cursor,
            "block table recovered"
        );
        Ok(())
    }

    // Cursor before count: the count is what makes a TOC entry live.
    fn persist_header(&mut self) -> Result<()> {
        self.file.write_u64(APPEND_CURSOR_OFFSET, self.append_cursor)?;
        self.file.store_u64_release(BLOCK_COUNT_OFFSET, self.block_count)
    }

    /// Allocate a block of `size` bytes for `id`.
    ///
    /// Idempotent by key: an existing `id` returns its current location
    /// without allocating, whatever `size` is passed.
    pub fn new_block(&mut self, id: BlockId, size: u64) -> Result<BlockInfo> {
        if let Some(info) = self.index.get(&id) {
            return Ok(*info);
        }
        if self.block_count >= self.config.max_block_count {
            return Err(StorageError::MaxBlockCountExceeded {
                capacity: self.config.max_block_count,
            });
        }
        let remaining = self.file.len().saturating_sub(self.append_cursor);
        let reservation = size
            .checked_add(self.config.block_header_size)
            .filter(|n| *n <= self.file.len())
            .map(|n| align_up(n, BLOCK_ALIGNMENT));
        let next_cursor = match reservation {
            Some(r) if r <= remaining => self.append_cursor + r,
            _ => {
                return Err(StorageError::LogFull {
                    requested: size,
                    remaining,
                });
            }
        };

        let info = BlockInfo {
            offset: self.append_cursor,
            size,
        };
        let entry = TocEntry::new(id, info.offset, info.size);
        self.file.write_at(self.config.toc_offset(self.block_count), entry.encode())?;

        self.block_count += 1;
        self.append_cursor = next_cursor;
        self.persist_header()?;
        self.index.insert(id, info);
        tracing::debug!(?id, offset = info.offset, size, blocks = self.block_count, "block allocated");
        Ok(info)
    }

    /// Write `data` at `intra_offset` inside block `id`.
    ///
    /// Fails with `BlockNotFound` for an unknown id and with `OutOfRange`
    /// (writing nothing) when the range exceeds the block's declared size.
    pub fn block_write_at(&mut self, id: BlockId, intra_offset: u64, data: &[u8]) -> Result<()> {
        let info = self.checked_range(id, intra_offset, data.len())?;
        self.file.write_at(info.offset + intra_offset, data)
    }

    /// Read `buf.len()` bytes at `intra_offset` inside block `id`.
    pub fn block_read_at(&self, id: BlockId, intra_offset: u64, buf: &mut [u8]) -> Result<()> {
        let info = self.checked_range(id, intra_offset, buf.len())?;
        self.file.read_at(info.offset + intra_offset, buf)
    }

    fn checked_range(&self, id: BlockId, intra_offset: u64, len: usize) -> Result<BlockInfo> {
        let info = *self.index.get(&id).ok_or(StorageError::BlockNotFound(id))?;
        let len = len as u64;
        match intra_offset.checked_add(len) {
            Some(end) if end <= info.size => Ok(info),
            _ => Err(StorageError::OutOfRange {
                offset: intra_offset,
                len,
                limit: info.size,
            }),
        }
    }

    pub fn block_info(&self, id: &BlockId) -> Option<BlockInfo> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &BlockId) -> bool {
        self.index.contains_key(id)
    }

    /// All indexed blocks in allocation order.
    pub fn blocks(&self) -> Vec<(BlockId, BlockInfo)> {
        let mut blocks: Vec<_> = self.index.iter().map(|(id, info)| (*id, *info)).collect();
        blocks.sort_by_key(|(_, info)| info.offset);
        blocks
    }

    /// Number of populated TOC entries.
    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Next free byte of the data region.
    pub fn append_cursor(&self) -> u64 {
        self.append_cursor
    }

    pub fn config(&self) -> BlockTableConfig {
        self.config
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
