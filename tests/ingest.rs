// tests/ingest.rs
use std::{collections::HashMap, io::Write};

use proptest::prelude::*;
use sensorvault::{Ingested, SensorIngest, SensorPacket, packet::BLOCK_RECORD_SIZE};
use sensorvault_core::{BlockId, StreamId, load_config};
use sensorvault_storage::{BlockTableConfig, BlockTableLog, OpenMode, TailingReader};
use tempfile::{NamedTempFile, TempDir, tempdir};

const MACS: [[u8; 6]; 2] = [[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01], [0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x02]];

fn write_config(dir: &TempDir, block_size: u64) -> NamedTempFile {
    let mut file = NamedTempFile::with_suffix_in(".json", dir.path()).expect("failed_to_unwrap_value");
    let text = format!(
        r#"{{
            "storage_path": {blocks:?},
            "storage_size": 1048576,
            "state_path": {state:?},
            "state_size": 4096,
            "packet_log_size": 65536,
            "block_size": {block_size},
            "max_block_count": 128,
            "flush": 0,
            "sensors": [
                {{"name": "kitchen", "location": "ground", "mac": "DE:AD:BE:EF:00:01", "type": 1}},
                {{"name": "attic", "location": "roof", "mac": [222, 173, 190, 239, 0, 2], "type": 1}}
            ]
        }}"#,
        blocks = dir.path().join("blocks.db"),
        state = dir.path().join("state.db"),
    );
    file.write_all(text.as_bytes()).expect("failed_to_unwrap_value");
    file
}

#[test]
fn test_ingest_files_readings_and_audits_every_packet() {
    let dir = tempdir().expect("failed_to_unwrap_value");
    let config_file = write_config(&dir, 32);
    let cfg = load_config(config_file.path()).expect("failed_to_unwrap_value");

    let mut sent = Vec::new();
    {
        let mut ingest = SensorIngest::open(&cfg).expect("failed_to_unwrap_value");
        for i in 0..10u16 {
            let packet = SensorPacket::new(u64::from(i), MACS[usize::from(i % 2)], 1, i * 10);
            assert!(matches!(
                ingest.ingest(&packet.encode()).expect("failed_to_unwrap_value"),
                Ingested::Stored { .. }
            ));
            sent.push(packet);
        }
        ingest.flush().expect("failed_to_unwrap_value");
    }

    let mut reader = TailingReader::open(cfg.packet_log_path()).expect("failed_to_unwrap_value");
    for expected in &sent {
        let mut buf = [0u8; 16];
        reader.read(&mut buf).expect("failed_to_unwrap_value");
        assert_eq!(SensorPacket::decode(&buf).expect("failed_to_unwrap_value"), *expected);
    }
    assert_eq!(reader.available(), 0);

    // 5 readings per sensor, 4 per block: two blocks per stream.
    let table = BlockTableLog::open_with(
        &cfg.storage_path,
        cfg.storage_size,
        BlockTableConfig::default().with_max_block_count(cfg.max_block_count),
        OpenMode::ReadOnly,
    )
    .expect("failed_to_unwrap_value");
    assert_eq!(table.block_count(), 4);
    let attic = StreamId::new(&MACS[1], 1);
    let mut record = [0u8; BLOCK_RECORD_SIZE];
    table
        .block_read_at(BlockId::new(attic, 1), 0, &mut record)
        .expect("failed_to_unwrap_value");
    assert_eq!(record, sent[9].block_record());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_counts_match_readings(picks in prop::collection::vec((0usize..3, any::<u16>()), 1..60)) {
        let dir = tempdir().expect("failed_to_unwrap_value");
        let config_file = write_config(&dir, 64);
        let cfg = load_config(config_file.path()).expect("failed_to_unwrap_value");
        let mut ingest = SensorIngest::open(&cfg).expect("failed_to_unwrap_value");

        let mut expected: HashMap<StreamId, (u32, u16)> = HashMap::new();
        for (who, value) in &picks {
            // index 2 is a sensor nobody configured
            let mac = if *who < 2 { MACS[*who] } else { [9, 9, 9, 9, 9, 9] };
            let packet = SensorPacket::new(1, mac, 1, *value);
            let outcome = ingest.ingest(&packet.encode()).expect("failed_to_unwrap_value");
            if *who < 2 {
                prop_assert!(matches!(outcome, Ingested::Stored { .. }), "unexpected outcome {:?}", outcome);
                let e = expected.entry(packet.stream_id()).or_default();
                *e = (e.0 + 1, *value);
            } else {
                prop_assert_eq!(outcome, Ingested::Unknown(packet.stream_id()));
            }
        }
        for slot in ingest.house().sensors() {
            let (count, value) = expected.get(&slot.stream_id).copied().unwrap_or((0, 0));
            prop_assert_eq!(slot.count, count);
            prop_assert_eq!(slot.value, value);
        }
    }
}
