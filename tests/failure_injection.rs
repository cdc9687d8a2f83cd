//! Failure injection: broken media, bad edits and oversized writes.

use std::collections::HashMap;
use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use config_store::config::loader::marshal_config;
use config_store::config::Codec;
use config_store::error::PersistenceError;
use config_store::store::{Backend, DatabaseBackend, MemoryBackend, SqliteTarget, DEFAULT_MAX_WRITE_LENGTH};
use config_store::{ConfigStore, StoreError, StoreOptions};

mod common;
use common::{options, valid_config, wait_until, ChangeRecorder, FlakyBackend, GatedBackend};

#[test]
fn test_failed_persist_leaves_store_unchanged() {
    let (backend, fail) = FlakyBackend::new();
    let store = ConfigStore::with_backend(Box::new(backend), options()).unwrap();
    let recorder = ChangeRecorder::attach(&store);
    let before = store.get();

    fail.store(true, Ordering::SeqCst);
    let mut cfg = store.get();
    cfg.service_settings.enable_developer = true;
    let err = store.set(cfg.clone()).unwrap_err();

    assert!(matches!(err, StoreError::Persistence(PersistenceError::Io(_))));
    assert_eq!(store.get(), before);

    fail.store(false, Ordering::SeqCst);
    let saved = store.set(cfg).unwrap();
    assert!(saved.service_settings.enable_developer);

    store.close().unwrap();
    assert_eq!(recorder.count(), 1);
}

#[test]
fn test_failed_initial_save_is_fatal() {
    let (backend, fail) = FlakyBackend::new();
    fail.store(true, Ordering::SeqCst);
    let result = ConfigStore::with_backend(Box::new(backend), options());
    assert!(matches!(result, Err(StoreError::Persistence(_))));
}

#[test]
fn test_corrupt_file_at_startup_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ \"service_settings\": ").unwrap();

    let result = ConfigStore::open(path.to_str().unwrap(), options());
    assert!(matches!(result, Err(StoreError::Deserialization(_))));
}

#[test]
fn test_invalid_external_edit_keeps_current_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, marshal_config(&valid_config(), Codec::Json).unwrap()).unwrap();

    let store = ConfigStore::open(path.to_str().unwrap(), options()).unwrap();
    let before = store.get();

    fs::write(&path, "not json at all").unwrap();
    assert!(matches!(store.sync(), Err(StoreError::Deserialization(_))));

    let mut invalid = valid_config();
    invalid.file_settings.driver_name = "floppy".into();
    fs::write(&path, marshal_config(&invalid, Codec::Json).unwrap()).unwrap();
    assert!(matches!(store.sync(), Err(StoreError::Validation(_))));

    assert_eq!(store.get(), before);
}

#[test]
fn test_external_edit_is_picked_up_by_watcher() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, marshal_config(&valid_config(), Codec::Json).unwrap()).unwrap();

    let store = ConfigStore::open(
        path.to_str().unwrap(),
        StoreOptions {
            watch: true,
            ..options()
        },
    )
    .unwrap();
    assert!(store.is_watching());
    let recorder = ChangeRecorder::attach(&store);

    let mut edited = store.get();
    edited.rate_limit_settings.max_burst = 7;
    fs::write(&path, marshal_config(&edited, Codec::Json).unwrap()).unwrap();

    assert!(wait_until(Duration::from_secs(10), || {
        store.get().rate_limit_settings.max_burst == 7
    }));
    store.close().unwrap();
    assert!(!store.is_watching());
    assert_eq!(recorder.count(), 1);
}

#[test]
fn test_own_write_does_not_trigger_second_notification() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, marshal_config(&valid_config(), Codec::Json).unwrap()).unwrap();

    let store = ConfigStore::open(
        path.to_str().unwrap(),
        StoreOptions {
            watch: true,
            ..options()
        },
    )
    .unwrap();
    let recorder = ChangeRecorder::attach(&store);

    let mut cfg = store.get();
    cfg.log_settings.console_level = "WARN".into();
    store.set(cfg).unwrap();

    // Give the watcher time to see the rename, then replay the echo by hand.
    std::thread::sleep(Duration::from_millis(500));
    assert!(!store.sync().unwrap());

    store.close().unwrap();
    assert_eq!(recorder.count(), 1);
}

#[test]
fn test_oversized_database_write_keeps_active_row() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("config.db");
    let dsn = format!("sqlite://{}", db_path.display());

    let store = ConfigStore::open(&dsn, options()).unwrap();
    let before = store.get();

    let probe = DatabaseBackend::open(
        SqliteTarget::Path(db_path.clone()),
        DEFAULT_MAX_WRITE_LENGTH,
        Duration::from_secs(1),
    )
    .unwrap();
    let active = probe.active_id().unwrap();
    assert!(active.is_some());

    let mut cfg = store.get();
    cfg.email_settings.feedback_name = "x".repeat(DEFAULT_MAX_WRITE_LENGTH + 1);
    let err = store.set(cfg).unwrap_err();

    assert!(matches!(
        err,
        StoreError::Persistence(PersistenceError::TooLarge { limit, actual })
            if limit == DEFAULT_MAX_WRITE_LENGTH && actual > limit
    ));
    assert_eq!(store.get(), before);
    assert_eq!(probe.active_id().unwrap(), active);
    assert_eq!(probe.revision_count().unwrap(), 1);
}

#[test]
fn test_database_store_points_sql_settings_at_itself() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("config.db");
    let store = ConfigStore::open(&format!("sqlite://{}", db_path.display()), options()).unwrap();

    let expected = db_path.display().to_string();
    assert_eq!(store.get().sql_settings.data_source.as_deref(), Some(expected.as_str()));
}

#[test]
fn test_read_only_store_does_not_write_repairs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    let mut cfg = valid_config();
    cfg.service_settings.site_url = "https://chat.example.com/".into();
    let original = marshal_config(&cfg, Codec::Json).unwrap();
    fs::write(&path, &original).unwrap();

    let store = ConfigStore::open(
        path.to_str().unwrap(),
        StoreOptions {
            read_only: true,
            ..options()
        },
    )
    .unwrap();

    assert_eq!(store.get().service_settings.site_url, "https://chat.example.com");
    assert_eq!(fs::read(&path).unwrap(), original);
    assert!(!store.reload().unwrap().saved);
    assert_eq!(fs::read(&path).unwrap(), original);
    assert!(matches!(store.set(store.get()), Err(StoreError::ReadOnly)));
}

#[test]
fn test_reload_racing_set_keeps_the_later_write() {
    let medium = Arc::new(MemoryBackend::with_initial(valid_config(), HashMap::new()));
    let (backend, gate) = GatedBackend::new(medium.clone());
    let store = Arc::new(ConfigStore::with_backend(Box::new(backend), options()).unwrap());

    // External edit, read by the reload below.
    let mut edited = store.get();
    edited.rate_limit_settings.max_burst = 7;
    medium.persist(&edited).unwrap();

    let (reached, release) = gate.arm();
    let reloader = {
        let store = store.clone();
        thread::spawn(move || store.reload())
    };
    reached.recv().unwrap();

    let writer = {
        let store = store.clone();
        thread::spawn(move || {
            let mut cfg = valid_config();
            cfg.rate_limit_settings.max_burst = 99;
            store.set(cfg)
        })
    };
    thread::sleep(Duration::from_millis(100));
    release.send(()).unwrap();

    reloader.join().unwrap().unwrap();
    writer.join().unwrap().unwrap();

    assert_eq!(medium.saved().unwrap().rate_limit_settings.max_burst, 99);
    assert_eq!(store.get().rate_limit_settings.max_burst, 99);
    assert!(!store.sync().unwrap());
}
