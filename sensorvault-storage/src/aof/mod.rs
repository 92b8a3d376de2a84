//! Append-only cursor log.
//!
//! One file, one 8-byte header holding the write cursor, raw records after it:
//!
//! ```text
//! [0:8)        write cursor (u64 LE), 8 <= cursor <= max_size
//! [8:cursor)   appended bytes, visible to readers
//! [cursor:max) unwritten or stale, never read
//! ```
//!
//! `AppendOnlyLog` is the single writer, `TailingReader` the wait-free reader.
//! The writer stores payload bytes before it publishes the new cursor, so a
//! reader that observes a cursor value can read everything before it.

mod tail;
mod writer;

pub use tail::TailingReader;
pub use writer::AppendOnlyLog;
