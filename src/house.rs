//! In-memory state of every configured sensor, and its snapshot in the
//! state store.
//!
//! Snapshot layout:
//! - `[0:4)` entry count, i32 LE
//! - `[4:4+16n)` one `StateEntry` per sensor, in configuration order

use std::collections::HashMap;

use anyhow::{Context, Result, bail};
use sensorvault_core::{HouseConfiguration, SensorConfig, StreamId};
use sensorvault_storage::{
    StateStore,
    format::{MAX_STATE_ENTRIES, STATE_COUNT_SIZE, STATE_ENTRY_SIZE, StateEntry},
};
use tracing::{debug, warn};

/// One configured sensor and its latest reading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SensorSlot {
    pub config: SensorConfig,
    pub stream_id: StreamId,
    pub value: u16,
    pub count: u32,
}

#[derive(Debug, Default)]
pub struct HouseState {
    sensors: Vec<SensorSlot>,
    index: HashMap<StreamId, usize>,
}

impl HouseState {
    /// Build the sensor table from the configured sensors.
    ///
    /// Sensors with a malformed hardware address or a duplicate stream id are
    /// skipped with a warning.
    pub fn from_config(cfg: &HouseConfiguration) -> Self {
        let mut state = Self::default();
        for sensor in &cfg.sensors {
            let stream_id = sensor.stream_id();
            if !stream_id.is_valid() {
                warn!(name = %sensor.name, mac = %sensor.mac_string(), "sensor has no valid stream id, skipped");
                continue;
            }
            if state.index.contains_key(&stream_id) {
                warn!(name = %sensor.name, %stream_id, "duplicate sensor, skipped");
                continue;
            }
            state.index.insert(stream_id, state.sensors.len());
            state.sensors.push(SensorSlot {
                config: sensor.clone(),
                stream_id,
                value: 0,
                count: 0,
            });
        }
        state
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn sensors(&self) -> &[SensorSlot] {
        &self.sensors
    }

    pub fn sensor(&self, stream_id: StreamId) -> Option<&SensorSlot> {
        self.index.get(&stream_id).map(|&i| &self.sensors[i])
    }

    /// Store `value` as the latest reading of `stream_id`.
    ///
    /// Returns the reading's sequence number within its stream (the count
    /// before this update), or `None` for an unknown stream.
    pub fn record(&mut self, stream_id: StreamId, value: u16) -> Option<u32> {
        let slot = &mut self.sensors[*self.index.get(&stream_id)?];
        let seq = slot.count;
        slot.value = value;
        slot.count = slot.count.wrapping_add(1);
        Some(seq)
    }

    /// Restore values and counts from a snapshot.
    ///
    /// Entries for sensors that are no longer configured are ignored. An
    /// implausible entry count is treated as an empty snapshot. Returns the
    /// number of sensors restored.
    pub fn load_snapshot(&mut self, store: &StateStore) -> Result<usize> {
        let mut count = [0u8; STATE_COUNT_SIZE];
        store.read(0, &mut count).context("read state snapshot header")?;
        let entries = i32::from_le_bytes(count);
        if entries == 0 {
            debug!(path = %store.path().display(), "empty state snapshot");
            return Ok(0);
        }
        let fits = |n: usize| (STATE_COUNT_SIZE + n * STATE_ENTRY_SIZE) as u64 <= store.capacity();
        let entries = match usize::try_from(entries) {
            Ok(n) if n <= MAX_STATE_ENTRIES && fits(n) => n,
            _ => {
                warn!(path = %store.path().display(), entries, "implausible state snapshot, starting empty");
                return Ok(0);
            }
        };

        let mut buf = vec![0u8; entries * STATE_ENTRY_SIZE];
        store
            .read(STATE_COUNT_SIZE as u64, &mut buf)
            .context("read state snapshot entries")?;
        let mut restored = 0;
        for chunk in buf.chunks_exact(STATE_ENTRY_SIZE) {
            let entry = StateEntry::decode(chunk);
            match self.index.get(&entry.stream_id()) {
                Some(&i) => {
                    self.sensors[i].value = entry.value();
                    self.sensors[i].count = entry.count();
                    restored += 1;
                }
                None => debug!(stream_id = %entry.stream_id(), "snapshot entry for unconfigured sensor ignored"),
            }
        }
        debug!(path = %store.path().display(), restored, "state snapshot loaded");
        Ok(restored)
    }

    /// Overwrite the snapshot with the current values and counts.
    pub fn save_snapshot(&self, store: &mut StateStore) -> Result<()> {
        if self.sensors.len() > MAX_STATE_ENTRIES {
            bail!(
                "{} sensors exceed the snapshot limit of {MAX_STATE_ENTRIES}",
                self.sensors.len()
            );
        }
        let mut buf = Vec::with_capacity(STATE_COUNT_SIZE + self.sensors.len() * STATE_ENTRY_SIZE);
        buf.extend_from_slice(&(self.sensors.len() as i32).to_le_bytes());
        for slot in &self.sensors {
            let entry = StateEntry::new(
                slot.stream_id.mac(),
                slot.stream_id.sensor_type(),
                slot.value,
                slot.count,
            );
            buf.extend_from_slice(entry.encode());
        }
        store
            .write(0, &buf)
            .with_context(|| format!("write state snapshot to {}", store.path().display()))
    }
}
