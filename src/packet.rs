//! Wire format of a single sensor reading.
//!
//! ```text
//! [0:6)   ticks, low 48 bits, LE
//! [6:12)  hardware address
//! [12:14) sensor type, u16 LE
//! [14:16) value, u16 LE
//! ```

use anyhow::{Result, bail};
use sensorvault_core::{MAC_LEN, StreamId, keys::format_mac};

pub const PACKET_SIZE: usize = 16;
const TICKS_LEN: usize = 6;
const TICKS_MASK: u64 = (1 << 48) - 1;
/// Size of the per-reading record kept in a stream block: ticks + value.
pub const BLOCK_RECORD_SIZE: usize = TICKS_LEN + 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SensorPacket {
    pub ticks: u64,
    pub mac: [u8; MAC_LEN],
    pub sensor_type: u16,
    pub value: u16,
}

impl SensorPacket {
    pub fn new(ticks: u64, mac: [u8; MAC_LEN], sensor_type: u16, value: u16) -> Self {
        Self {
            ticks: ticks & TICKS_MASK,
            mac,
            sensor_type,
            value,
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PACKET_SIZE {
            bail!("sensor packet must be {PACKET_SIZE} bytes, got {}", bytes.len());
        }
        let mut ticks = [0u8; 8];
        ticks[..TICKS_LEN].copy_from_slice(&bytes[0..6]);
        let mut mac = [0u8; MAC_LEN];
        mac.copy_from_slice(&bytes[6..12]);
        Ok(Self {
            ticks: u64::from_le_bytes(ticks),
            mac,
            sensor_type: u16::from_le_bytes([bytes[12], bytes[13]]),
            value: u16::from_le_bytes([bytes[14], bytes[15]]),
        })
    }

    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let mut out = [0u8; PACKET_SIZE];
        out[0..6].copy_from_slice(&self.ticks.to_le_bytes()[..TICKS_LEN]);
        out[6..12].copy_from_slice(&self.mac);
        out[12..14].copy_from_slice(&self.sensor_type.to_le_bytes());
        out[14..16].copy_from_slice(&self.value.to_le_bytes());
        out
    }

    pub fn stream_id(&self) -> StreamId {
        StreamId::new(&self.mac, self.sensor_type)
    }

    /// The reading as stored inside its stream block.
    pub fn block_record(&self) -> [u8; BLOCK_RECORD_SIZE] {
        let mut out = [0u8; BLOCK_RECORD_SIZE];
        out[..TICKS_LEN].copy_from_slice(&self.ticks.to_le_bytes()[..TICKS_LEN]);
        out[TICKS_LEN..].copy_from_slice(&self.value.to_le_bytes());
        out
    }
}

impl std::fmt::Display for SensorPacket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ticks={} mac={} sensor={} value={}",
            self.ticks,
            format_mac(&self.mac),
            self.sensor_type,
            self.value
        )
    }
}
