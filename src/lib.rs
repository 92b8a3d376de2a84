//! Sensor telemetry storage.
//!
//! This crate provides:
//! - The 16-byte sensor packet codec (`packet`).
//! - The in-memory house state and its snapshot (`house`).
//! - The ingestion pipeline tying the packet log, block table and state
//!   store together (`ingest`).
//!
//! The storage primitives live in `sensorvault-storage`, keys and
//! configuration in `sensorvault-core`.
pub mod house;
pub mod ingest;
pub mod packet;

pub use house::{HouseState, SensorSlot};
pub use ingest::{IngestStats, Ingested, SensorIngest};
pub use packet::{PACKET_SIZE, SensorPacket};
