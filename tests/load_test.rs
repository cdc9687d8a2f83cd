//! Concurrent readers and writers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use config_store::ConfigStore;

mod common;
use common::{valid_config, ChangeRecorder};

const WRITERS: u32 = 4;
const WRITES_PER_WRITER: u32 = 25;

#[test]
fn test_concurrent_sets_are_serialized_and_ordered() {
    let store = Arc::new(ConfigStore::memory().unwrap());
    store.set(valid_config()).unwrap();
    let recorder = ChangeRecorder::attach(&store);

    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let store = store.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let mut reads = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    let cfg = store.snapshot();
                    // Every published document is complete and valid.
                    assert!(cfg.rate_limit_settings.per_sec >= 1);
                    assert!(cfg.sql_settings.data_source.is_some());
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    let start = Instant::now();
    let writers: Vec<_> = (0..WRITERS)
        .map(|w| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..WRITES_PER_WRITER {
                    let mut cfg = store.get();
                    cfg.rate_limit_settings.per_sec = 1 + w * 1000 + i;
                    store.set(cfg).unwrap();
                }
            })
        })
        .collect();

    for writer in writers {
        writer.join().unwrap();
    }
    let elapsed = start.elapsed();
    stop.store(true, Ordering::Relaxed);
    let reads: u64 = readers.into_iter().map(|r| r.join().unwrap()).sum();

    store.flush_listeners();
    let changes = recorder.changes();
    assert_eq!(changes.len(), (WRITERS * WRITES_PER_WRITER) as usize);

    // Each notification starts where the previous one ended.
    for pair in changes.windows(2) {
        assert_eq!(pair[0].1, pair[1].0);
    }
    assert_eq!(changes.last().unwrap().1, store.get());

    println!(
        "{} sets in {:?} with {} concurrent reads",
        WRITERS * WRITES_PER_WRITER,
        elapsed,
        reads
    );
}

#[test]
fn test_slow_listener_does_not_block_readers() {
    let store = Arc::new(ConfigStore::memory().unwrap());
    store.add_listener(|_, _| thread::sleep(Duration::from_millis(200)));

    let mut cfg = store.get();
    cfg.service_settings.enable_developer = true;
    store.set(cfg).unwrap();

    let start = Instant::now();
    for _ in 0..1000 {
        assert!(store.snapshot().service_settings.enable_developer);
    }
    assert!(start.elapsed() < Duration::from_millis(200));

    store.close().unwrap();
}
