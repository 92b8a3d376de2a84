//! On-disk layouts shared by the storage files.
//!
//! Defines:
//! - Header sizes of the append-only log and the block table.
//! - `TocEntry`: one 32-byte table-of-contents record of the block table.
//! - `StateEntry`: one 16-byte sensor record of a state snapshot.
//!
//! All integers are little-endian on disk.

use std::mem;

use bytemuck::{Pod, Zeroable};
pub use sensorvault_core::config::DEFAULT_MAX_BLOCK_COUNT;
use sensorvault_core::{BlockId, MAC_LEN, StreamId};

/// Append-only log header: the write cursor at offset 0.
pub const LOG_HEADER_SIZE: u64 = 8;
/// Block table header: block count at 0, append cursor at 8, rest reserved.
pub const BLOCK_LOG_HEADER_SIZE: u64 = 32;
/// Offset of the block count in the block table header.
pub const BLOCK_COUNT_OFFSET: u64 = 0;
/// Offset of the append cursor in the block table header.
pub const APPEND_CURSOR_OFFSET: u64 = 8;
/// Size of one table-of-contents record.
pub const TOC_ENTRY_SIZE: u64 = mem::size_of::<TocEntry>() as u64;
/// Every block reservation is rounded up to this many bytes.
pub const BLOCK_ALIGNMENT: u64 = 32;
/// Per-block header reservation folded into each allocation.
pub const DEFAULT_BLOCK_HEADER_SIZE: u64 = 64;

/// Size of one snapshot record.
pub const STATE_ENTRY_SIZE: usize = mem::size_of::<StateEntry>();
/// Size of the `numEntries` prefix of a snapshot.
pub const STATE_COUNT_SIZE: usize = 4;
/// Largest `numEntries` accepted when reading a snapshot.
pub const MAX_STATE_ENTRIES: usize = 1024;

/// Table-of-contents record of the block table.
///
/// - `id`: 16-byte block key.
/// - `offset`: start of the block's data region within the file.
/// - `size`: declared capacity of the block.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TocEntry {
    pub id: BlockId,
    offset: u64,
    size: u64,
}

unsafe impl Zeroable for TocEntry {}
unsafe impl Pod for TocEntry {}
const _: () = assert!(mem::size_of::<TocEntry>() == 32);

impl TocEntry {
    pub fn new(id: BlockId, offset: u64, size: u64) -> Self {
        Self {
            id,
            offset: offset.to_le(),
            size: size.to_le(),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from_le(self.offset)
    }

    pub fn size(&self) -> u64 {
        u64::from_le(self.size)
    }

    pub fn decode(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(bytes)
    }

    pub fn encode(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

/// Snapshot record of one sensor channel.
///
/// Layout: `[0:6)` hardware address, `[6:8)` sensor type, `[8:10)` last
/// value, `[10:12)` reserved, `[12:16)` update count.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StateEntry {
    pub mac: [u8; MAC_LEN],
    sensor_type: u16,
    value: u16,
    _reserved: u16,
    count: u32,
}

unsafe impl Zeroable for StateEntry {}
unsafe impl Pod for StateEntry {}
const _: () = assert!(mem::size_of::<StateEntry>() == 16);

impl StateEntry {
    pub fn new(mac: [u8; MAC_LEN], sensor_type: u16, value: u16, count: u32) -> Self {
        Self {
            mac,
            sensor_type: sensor_type.to_le(),
            value: value.to_le(),
            _reserved: 0,
            count: count.to_le(),
        }
    }

    pub fn sensor_type(&self) -> u16 {
        u16::from_le(self.sensor_type)
    }

    pub fn value(&self) -> u16 {
        u16::from_le(self.value)
    }

    pub fn count(&self) -> u32 {
        u32::from_le(self.count)
    }

    pub fn stream_id(&self) -> StreamId {
        StreamId::new(&self.mac, self.sensor_type())
    }

    pub fn decode(bytes: &[u8]) -> Self {
        bytemuck::pod_read_unaligned(bytes)
    }

    pub fn encode(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toc_entry_layout() {
        let id = BlockId::from_bytes([7u8; 16]);
        let entry = TocEntry::new(id, 0x1122, 0x40);
        let bytes = entry.encode();
        assert_eq!(bytes.len(), 32);
        assert_eq!(&bytes[0..16], &[7u8; 16]);
        assert_eq!(&bytes[16..24], &0x1122u64.to_le_bytes());
        assert_eq!(&bytes[24..32], &0x40u64.to_le_bytes());
        let decoded = TocEntry::decode(bytes);
        assert_eq!(decoded.offset(), 0x1122);
        assert_eq!(decoded.size(), 0x40);
        assert_eq!(decoded.id, id);
    }

    #[test]
    fn test_state_entry_layout() {
        let entry = StateEntry::new([0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01], 1, 0x0203, 0x0A0B0C0D);
        let bytes = entry.encode();
        assert_eq!(bytes, &[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 1, 0, 0x03, 0x02, 0, 0, 0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(StateEntry::decode(bytes).stream_id().raw(), 0xDEAD_BEEF_0001_0001);
    }
}
