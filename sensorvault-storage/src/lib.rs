//! Persistence core for sensorvault.
//!
//! This crate provides:
//! - `MappedFile`: a fixed-size file with one bounds-checked memory mapping.
//! - `AppendOnlyLog` / `TailingReader`: the cursor log and its wait-free reader.
//! - `StateStore`: a raw, fixed-size snapshot blob.
//! - `BlockTableLog`: a bump-pointer block allocator indexed by a bounded TOC.
//!
//! Every file has exactly one writer at a time; readers never block it.
//! Writes become visible to readers as soon as they land in the mapping and
//! durable only after an explicit `flush`.
pub mod aof;
pub mod block;
pub mod error;
pub mod format;
pub mod mapped;
pub mod state;

pub use aof::{AppendOnlyLog, TailingReader};
pub use block::{BlockInfo, BlockTableConfig, BlockTableLog};
pub use error::{Result, StorageError};
pub use mapped::{MappedFile, OpenMode};
pub use state::StateStore;
