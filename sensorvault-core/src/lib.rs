//! Core primitives for sensorvault.
//!
//! This crate provides:
//! - Stream and block keys (`StreamId`, `BlockId`) shared by every storage file.
//! - Size and alignment helpers for on-disk layouts.
//! - The house configuration model and its loader (`load_config`).
//! - One-shot logging initialisation (`logs::init_logging`).
pub mod config;
pub mod keys;
pub mod logs;
pub mod size;

pub use config::{HouseConfiguration, SensorConfig, load_config};
pub use keys::{BlockId, MAC_LEN, StreamId, make_stream_id};
