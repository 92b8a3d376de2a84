//! House configuration consumed by the storage core.
//!
//! The configuration is a JSON document (or TOML, picked by file extension)
//! naming the storage files, their fixed sizes, the ingestion ports and the
//! fixed universe of sensors known to this deployment.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, de};

use crate::{
    keys::{StreamId, format_mac},
    size::{KIB, MIB},
};

/// Default capacity of the raw packet log.
pub const DEFAULT_PACKET_LOG_SIZE: u64 = 64 * MIB;
/// Default declared size of one stream block.
pub const DEFAULT_BLOCK_SIZE: u64 = 64 * KIB;
/// Default TOC capacity of the block table, shared with the storage layer.
pub const DEFAULT_MAX_BLOCK_COUNT: u64 = 32 * 1024;

/// One configured sensor channel.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub location: String,
    /// Hardware address; kept verbatim so that malformed entries can be
    /// reported instead of rejected at parse time.
    #[serde(deserialize_with = "deserialize_mac")]
    pub mac: Vec<u8>,
    #[serde(rename = "type")]
    pub sensor_type: u16,
}

impl SensorConfig {
    pub fn stream_id(&self) -> StreamId {
        StreamId::new(&self.mac, self.sensor_type)
    }

    pub fn mac_string(&self) -> String {
        format_mac(&self.mac)
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct HouseConfiguration {
    /// Block table file holding per-stream data blocks.
    pub storage_path: PathBuf,
    pub storage_size: u64,
    /// State snapshot file.
    pub state_path: PathBuf,
    pub state_size: u64,
    #[serde(default)]
    pub tcp_port: u16,
    #[serde(default)]
    pub udp_port: u16,
    #[serde(default)]
    pub uds_port: String,
    /// Flush period in seconds, 0 disables periodic flushing.
    #[serde(default, rename = "flush")]
    pub flush_period_secs: u64,
    #[serde(default)]
    pub sensors: Vec<SensorConfig>,
    /// Raw packet log; defaults to `<storage_path>.packets`.
    #[serde(default)]
    pub packet_log_path: Option<PathBuf>,
    #[serde(default = "default_packet_log_size")]
    pub packet_log_size: u64,
    #[serde(default = "default_block_size")]
    pub block_size: u64,
    #[serde(default = "default_max_block_count")]
    pub max_block_count: u64,
}

fn default_packet_log_size() -> u64 {
    DEFAULT_PACKET_LOG_SIZE
}

fn default_block_size() -> u64 {
    DEFAULT_BLOCK_SIZE
}

fn default_max_block_count() -> u64 {
    DEFAULT_MAX_BLOCK_COUNT
}

impl HouseConfiguration {
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s).context("parse json house configuration")
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parse toml house configuration")
    }

    pub fn packet_log_path(&self) -> PathBuf {
        self.packet_log_path.clone().unwrap_or_else(|| {
            let mut p = self.storage_path.clone().into_os_string();
            p.push(".packets");
            PathBuf::from(p)
        })
    }

    pub fn flush_period(&self) -> Option<Duration> {
        (self.flush_period_secs > 0).then(|| Duration::from_secs(self.flush_period_secs))
    }
}

/// Load a house configuration file.
///
/// `.toml` files are parsed as TOML, everything else as JSON.
pub fn load_config(path: impl AsRef<Path>) -> Result<HouseConfiguration> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => HouseConfiguration::from_toml_str(&text),
        _ => HouseConfiguration::from_json_str(&text),
    }
    .with_context(|| format!("load config {}", path.display()))?;
    tracing::debug!(path = %path.display(), sensors = cfg.sensors.len(), "house configuration loaded");
    Ok(cfg)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MacRepr {
    Text(String),
    Bytes(Vec<MacByte>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MacByte {
    Int(u64),
    Text(String),
}

fn parse_hex_byte(s: &str) -> Option<u8> {
    let s = s.trim();
    let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u8::from_str_radix(digits, 16).ok()
}

fn deserialize_mac<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    match MacRepr::deserialize(deserializer)? {
        MacRepr::Text(s) => s
            .split([':', '-'])
            .map(|part| parse_hex_byte(part).ok_or_else(|| de::Error::custom(format!("invalid mac byte {part:?}"))))
            .collect(),
        MacRepr::Bytes(bytes) => bytes
            .into_iter()
            .map(|b| match b {
                MacByte::Int(v) => u8::try_from(v).map_err(|_| de::Error::custom(format!("mac byte {v} out of range"))),
                MacByte::Text(s) => parse_hex_byte(&s).ok_or_else(|| de::Error::custom(format!("invalid mac byte {s:?}"))),
            })
            .collect(),
    }
}
