// tests/append_log.rs

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
};

use proptest::prelude::*;
use sensorvault_storage::{AppendOnlyLog, StorageError, TailingReader};
use tempfile::tempdir;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// After N appends the cursor sits at 8 + the summed lengths and a fresh
    /// reader returns exactly the written bytes in order.
    #[test]
    fn prop_appends_are_read_back_in_order(records in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..32)) {
        let dir = tempdir().expect("failed_to_unwrap_value");
        let path = dir.path().join("prop.log");
        let mut log = AppendOnlyLog::open(&path, 8 + 64 * 32).expect("failed_to_unwrap_value");
        for r in &records {
            log.append(r).expect("failed_to_unwrap_value");
        }
        let total: usize = records.iter().map(Vec::len).sum();
        prop_assert_eq!(log.write_cursor(), 8 + total as u64);

        let mut reader = TailingReader::open(&path).expect("failed_to_unwrap_value");
        let mut all = vec![0u8; total];
        reader.read(&mut all).expect("failed_to_unwrap_value");
        prop_assert_eq!(all, records.concat());
        let mut one = [0u8; 1];
        prop_assert!(reader.read(&mut one).is_err());
    }

    /// A read asking for more than is visible fails and leaves the cursor alone.
    #[test]
    fn prop_oversized_read_does_not_move_cursor(written in 0usize..100, extra in 1usize..50) {
        let dir = tempdir().expect("failed_to_unwrap_value");
        let path = dir.path().join("over.log");
        let mut log = AppendOnlyLog::open(&path, 256).expect("failed_to_unwrap_value");
        log.append(&vec![7u8; written]).expect("failed_to_unwrap_value");

        let mut reader = TailingReader::open(&path).expect("failed_to_unwrap_value");
        let before = reader.position();
        let mut buf = vec![0u8; written + extra];
        let err = reader.read(&mut buf).unwrap_err();
        let is_not_enough = matches!(err, StorageError::NotEnoughData { .. });
        prop_assert!(is_not_enough);
        prop_assert_eq!(reader.position(), before);
    }
}

/// A writer thread appends fixed-size records while a reader in another thread
/// tails the same file through its own mapping.
#[test]
fn test_concurrent_tailing_reader() {
    const RECORDS: u32 = 2_000;
    let dir = tempdir().expect("failed_to_unwrap_value");
    let path = dir.path().join("live.log");
    let mut log = AppendOnlyLog::open(&path, 8 + u64::from(RECORDS) * 4).expect("failed_to_unwrap_value");
    let mut reader = TailingReader::open(&path).expect("failed_to_unwrap_value");
    let done = Arc::new(AtomicBool::new(false));

    let writer_done = done.clone();
    let writer = thread::spawn(move || {
        for i in 0..RECORDS {
            log.append(&i.to_le_bytes()).expect("failed_to_unwrap_value");
        }
        writer_done.store(true, Ordering::Release);
    });

    let mut next = 0u32;
    let mut buf = [0u8; 4];
    while next < RECORDS {
        match reader.read(&mut buf) {
            Ok(()) => {
                assert_eq!(u32::from_le_bytes(buf), next);
                next += 1;
            }
            Err(e) if e.is_not_enough_data() => {
                assert!(!(done.load(Ordering::Acquire) && reader.available() == 0 && next < RECORDS));
                thread::yield_now();
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    writer.join().expect("writer thread panicked");
    assert_eq!(reader.available(), 0);
}
