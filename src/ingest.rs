//! Packet ingestion: raw audit log, per-stream blocks and the state snapshot.
//!
//! Every received packet is appended to the packet log first. Packets from
//! configured sensors are then filed into their stream's current block and
//! recorded in the house state. The snapshot is written on `flush`, either
//! explicitly or every configured flush period.
//!
//! A reading's block slot is derived from the sensor's update count. Counts
//! are only durable as of the last snapshot, so readings filed after the last
//! flush of a process that did not shut down cleanly are overwritten by the
//! next readings of the same stream. The packet log still holds every one of
//! them.

use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use crossbeam::channel::{Receiver, never, select, tick};
use sensorvault_core::{BlockId, HouseConfiguration, StreamId};
use sensorvault_storage::{AppendOnlyLog, BlockTableConfig, BlockTableLog, OpenMode, StateStore};
use tracing::{debug, info, warn};

use crate::{
    house::HouseState,
    packet::{BLOCK_RECORD_SIZE, SensorPacket},
};

/// Outcome of ingesting one packet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ingested {
    /// Filed at record `slot` of `block`.
    Stored { stream: StreamId, block: BlockId, slot: u64 },
    /// Logged, but the sender is not a configured sensor.
    Unknown(StreamId),
    /// Logged, but not a well-formed sensor packet.
    Malformed,
    /// Logged, but its block could not be allocated or written.
    BlockFailed(StreamId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub stored: u64,
    pub unknown: u64,
    pub malformed: u64,
    pub block_failures: u64,
    pub dropped: u64,
    pub flushes: u64,
}

pub struct SensorIngest {
    packets: AppendOnlyLog,
    blocks: BlockTableLog,
    state: StateStore,
    house: HouseState,
    records_per_block: u64,
    block_size: u64,
    flush_period: Option<Duration>,
    last_flush: Instant,
    stats: IngestStats,
}

impl SensorIngest {
    /// Open (or create) the three storage files named by `cfg` and restore
    /// the house state from the last snapshot.
    pub fn open(cfg: &HouseConfiguration) -> Result<Self> {
        let records_per_block = cfg.block_size / BLOCK_RECORD_SIZE as u64;
        if records_per_block == 0 {
            bail!("block_size {} cannot hold a single reading", cfg.block_size);
        }
        let packet_log_path = cfg.packet_log_path();
        let packets = AppendOnlyLog::open(&packet_log_path, cfg.packet_log_size)
            .with_context(|| format!("open packet log {}", packet_log_path.display()))?;
        let blocks = BlockTableLog::open_with(
            &cfg.storage_path,
            cfg.storage_size,
            BlockTableConfig::default().with_max_block_count(cfg.max_block_count),
            OpenMode::ReadWrite,
        )
        .with_context(|| format!("open block table {}", cfg.storage_path.display()))?;
        let state = StateStore::open(&cfg.state_path, cfg.state_size)
            .with_context(|| format!("open state store {}", cfg.state_path.display()))?;

        let mut house = HouseState::from_config(cfg);
        let restored = house.load_snapshot(&state)?;
        info!(
            sensors = house.len(),
            restored,
            blocks = blocks.block_count(),
            packet_cursor = packets.write_cursor(),
            "ingest opened"
        );
        Ok(Self {
            packets,
            blocks,
            state,
            house,
            records_per_block,
            block_size: cfg.block_size,
            flush_period: cfg.flush_period(),
            last_flush: Instant::now(),
            stats: IngestStats::default(),
        })
    }

    /// Ingest one raw packet.
    ///
    /// Only a failed append to the packet log is an error; the packet is then
    /// dropped entirely.
    pub fn ingest(&mut self, raw: &[u8]) -> Result<Ingested> {
        if let Err(e) = self.packets.append(raw) {
            self.stats.dropped += 1;
            return Err(e).context("packet dropped");
        }
        let packet = match SensorPacket::decode(raw) {
            Ok(packet) => packet,
            Err(e) => {
                debug!(error = %e, "malformed packet");
                self.stats.malformed += 1;
                return Ok(Ingested::Malformed);
            }
        };
        let stream = packet.stream_id();
        let Some(slot) = self.house.sensor(stream) else {
            debug!(%stream, "packet from unknown sensor");
            self.stats.unknown += 1;
            return Ok(Ingested::Unknown(stream));
        };

        let seq = u64::from(slot.count);
        let block = BlockId::new(stream, seq / self.records_per_block);
        let slot = seq % self.records_per_block;
        let filed = self
            .blocks
            .new_block(block, self.block_size)
            .and_then(|_| {
                self.blocks
                    .block_write_at(block, slot * BLOCK_RECORD_SIZE as u64, &packet.block_record())
            });
        if let Err(e) = filed {
            warn!(%stream, %block, error = %e, "sensor reading not filed");
            self.stats.block_failures += 1;
            return Ok(Ingested::BlockFailed(stream));
        }

        self.house.record(stream, packet.value);
        self.stats.stored += 1;
        Ok(Ingested::Stored { stream, block, slot })
    }

    /// Write the snapshot and flush all three files.
    pub fn flush(&mut self) -> Result<()> {
        self.house.save_snapshot(&mut self.state)?;
        self.packets.flush().context("flush packet log")?;
        self.blocks.flush().context("flush block table")?;
        self.state.flush().context("flush state store")?;
        self.last_flush = Instant::now();
        self.stats.flushes += 1;
        info!(stats = ?self.stats, "ingest flushed");
        Ok(())
    }

    /// Flush if a flush period is configured and has elapsed at `now`.
    pub fn maybe_flush(&mut self, now: Instant) -> Result<bool> {
        match self.flush_period {
            Some(period) if now.duration_since(self.last_flush) >= period => self.flush().map(|()| true),
            _ => Ok(false),
        }
    }

    /// Ingest packets from `packets` until every sender has hung up, flushing
    /// every flush period and once more on exit.
    pub fn run(mut self, packets: Receiver<Vec<u8>>) -> Result<IngestStats> {
        let ticker = match self.flush_period {
            Some(period) => tick(period),
            None => never(),
        };
        loop {
            select! {
                recv(packets) -> msg => match msg {
                    Ok(raw) => {
                        if let Err(e) = self.ingest(&raw) {
                            warn!(error = %e, "ingest failed");
                        }
                    }
                    Err(_) => break,
                },
                recv(ticker) -> _ => self.flush()?,
            }
        }
        self.flush()?;
        info!(stats = ?self.stats, "ingest stopped");
        Ok(self.stats)
    }

    pub fn house(&self) -> &HouseState {
        &self.house
    }

    pub fn blocks(&self) -> &BlockTableLog {
        &self.blocks
    }

    pub fn stats(&self) -> IngestStats {
        self.stats
    }
}
