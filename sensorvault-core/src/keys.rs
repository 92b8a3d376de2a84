//! Keys identifying sensor channels and the blocks that store them.
//!
//! - `StreamId`: 64-bit key packing a 6-byte hardware address and a 16-bit
//!   sensor type.
//! - `BlockId`: 16-byte opaque key used by the block table; the low 8 bytes
//!   carry a `StreamId`, the high 8 bytes a sub-stream discriminator.

use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Length of a sensor hardware address in bytes.
pub const MAC_LEN: usize = 6;

/// Key of one physical sensor channel.
///
/// Layout: address bytes in bits 63..16 (first address byte highest),
/// sensor type in bits 15..0. Zero is reserved as the invalid key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(u64);

impl StreamId {
    pub const INVALID: StreamId = StreamId(0);

    /// Pack a hardware address and sensor type. Returns `StreamId::INVALID`
    /// when `mac` is not exactly six bytes long.
    pub fn new(mac: &[u8], sensor_type: u16) -> Self {
        let Ok(mac) = <[u8; MAC_LEN]>::try_from(mac) else {
            return Self::INVALID;
        };
        let mut id = 0u64;
        for byte in mac {
            id = (id << 8) | u64::from(byte);
        }
        StreamId((id << 16) | u64::from(sensor_type))
    }

    pub const fn from_raw(raw: u64) -> Self {
        StreamId(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    pub fn mac(self) -> [u8; MAC_LEN] {
        let bytes = self.0.to_be_bytes();
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&bytes[..MAC_LEN]);
        mac
    }

    pub const fn sensor_type(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

/// Free-function form of [`StreamId::new`].
pub fn make_stream_id(mac: &[u8], sensor_type: u16) -> StreamId {
    StreamId::new(mac, sensor_type)
}

impl From<StreamId> for u64 {
    fn from(id: StreamId) -> u64 {
        id.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", format_mac(&self.mac()), self.sensor_type())
    }
}

/// Render a hardware address as `DE:AD:BE:EF:00:01`.
pub fn format_mac(mac: &[u8]) -> String {
    mac.iter()
        .map(|b| hex::encode_upper([*b]))
        .collect::<Vec<_>>()
        .join(":")
}

/// 16-byte block key. Compared and hashed byte for byte.
#[repr(transparent)]
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub [u8; 16]);

unsafe impl Zeroable for BlockId {}
unsafe impl Pod for BlockId {}

impl BlockId {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        BlockId(bytes)
    }

    /// Block key for `stream`; `sub_stream` distinguishes successive blocks of
    /// the same stream.
    pub fn new(stream: StreamId, sub_stream: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..8].copy_from_slice(&stream.raw().to_le_bytes());
        bytes[8..].copy_from_slice(&sub_stream.to_le_bytes());
        BlockId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn stream_id(&self) -> StreamId {
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.0[..8]);
        StreamId(u64::from_le_bytes(low))
    }

    pub fn sub_stream(&self) -> u64 {
        let mut high = [0u8; 8];
        high.copy_from_slice(&self.0[8..]);
        u64::from_le_bytes(high)
    }
}

impl From<StreamId> for BlockId {
    fn from(stream: StreamId) -> Self {
        BlockId::new(stream, 0)
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", hex::encode(self.0))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.stream_id(), self.sub_stream())
    }
}
