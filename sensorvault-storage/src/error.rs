//! Error and Result types for storage operations.

use std::{io, path::PathBuf};

use sensorvault_core::BlockId;
use thiserror::Error;

/// A convenience `Result` type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Failure kinds of the storage core. Every kind is local and recoverable.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An append or block allocation would run past the file's fixed capacity.
    #[error("log full: {requested} bytes requested, {remaining} remaining")]
    LogFull {
        /// Bytes the operation needed.
        requested: u64,
        /// Bytes still free before the end of the file.
        remaining: u64,
    },

    /// A block write or read targets an unknown block id.
    #[error("block not found: {0:?}")]
    BlockNotFound(BlockId),

    /// An offset/length pair falls outside the valid bounds of a file or block.
    #[error("range out of bounds: offset {offset} + len {len} exceeds {limit}")]
    OutOfRange {
        offset: u64,
        len: u64,
        limit: u64,
    },

    /// The table of contents has no free entries left.
    #[error("max block count exceeded: capacity {capacity}")]
    MaxBlockCountExceeded { capacity: u64 },

    /// A tailing read asked for bytes the writer has not published yet.
    #[error("not enough data: {requested} bytes requested, {available} visible")]
    NotEnoughData { requested: u64, available: u64 },

    /// A write was attempted through a read-only mapping.
    #[error("file is mapped read-only: {0}")]
    ReadOnly(PathBuf),

    /// Another writer already holds this file.
    #[error("file already has a live writer: {0}")]
    WriterLocked(PathBuf),

    /// The requested file size cannot hold the fixed header.
    #[error("capacity too small: need at least {required} bytes, got {max_size}")]
    CapacityTooSmall { required: u64, max_size: u64 },

    /// A read-only open targeted a file that does not exist.
    #[error("file not found: {0}")]
    NotFound(PathBuf),

    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl StorageError {
    /// True for conditions a tailing reader should retry later.
    pub fn is_not_enough_data(&self) -> bool {
        matches!(self, StorageError::NotEnoughData { .. })
    }
}
