//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use config_store::config::Config;
use config_store::error::PersistenceError;
use config_store::store::{Backend, MemoryBackend};
use config_store::{ConfigStore, StoreOptions};

/// A valid document with a site URL set.
pub fn valid_config() -> Config {
    let mut cfg = Config::default();
    cfg.set_defaults();
    cfg.service_settings.site_url = "https://chat.example.com".into();
    cfg
}

/// Options for tests: no watcher, empty environment.
pub fn options() -> StoreOptions {
    StoreOptions {
        watch: false,
        ..StoreOptions::default()
    }
}

/// Memory backend whose persist can be made to fail.
pub struct FlakyBackend {
    inner: MemoryBackend,
    fail: Arc<AtomicBool>,
}

impl FlakyBackend {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let fail = Arc::new(AtomicBool::new(false));
        (
            Self {
                inner: MemoryBackend::new(),
                fail: fail.clone(),
            },
            fail,
        )
    }
}

impl Backend for FlakyBackend {
    fn describe(&self) -> String {
        "flaky".to_string()
    }

    fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.inner.load()
    }

    fn persist(&self, config: &Config) -> Result<Vec<u8>, PersistenceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PersistenceError::Io(std::io::Error::other("disk full")));
        }
        self.inner.persist(config)
    }

    fn get_file(&self, name: &str) -> Result<Vec<u8>, PersistenceError> {
        self.inner.get_file(name)
    }

    fn set_file(&self, name: &str, data: &[u8]) -> Result<(), PersistenceError> {
        self.inner.set_file(name, data)
    }

    fn has_file(&self, name: &str) -> Result<bool, PersistenceError> {
        self.inner.has_file(name)
    }

    fn remove_file(&self, name: &str) -> Result<(), PersistenceError> {
        self.inner.remove_file(name)
    }
}

/// Memory backend whose next `load` can be held after it has read the medium.
pub struct GatedBackend {
    medium: Arc<MemoryBackend>,
    gate: Arc<Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>>,
}

/// Arms a [`GatedBackend`].
#[derive(Clone)]
pub struct Gate {
    slot: Arc<Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>>,
}

impl Gate {
    /// Hold the next load. Returns a receiver signalled once the bytes were
    /// read, and a sender that lets the load continue.
    pub fn arm(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (reached_tx, reached_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        *self.slot.lock() = Some((reached_tx, release_rx));
        (reached_rx, release_tx)
    }
}

impl GatedBackend {
    pub fn new(medium: Arc<MemoryBackend>) -> (Self, Gate) {
        let slot = Arc::new(Mutex::new(None));
        (
            Self {
                medium,
                gate: slot.clone(),
            },
            Gate { slot },
        )
    }
}

impl Backend for GatedBackend {
    fn describe(&self) -> String {
        "gated".to_string()
    }

    fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        let bytes = self.medium.load()?;
        let armed = self.gate.lock().take();
        if let Some((reached, release)) = armed {
            let _ = reached.send(());
            let _ = release.recv();
        }
        Ok(bytes)
    }

    fn persist(&self, config: &Config) -> Result<Vec<u8>, PersistenceError> {
        self.medium.persist(config)
    }

    fn get_file(&self, name: &str) -> Result<Vec<u8>, PersistenceError> {
        self.medium.get_file(name)
    }

    fn set_file(&self, name: &str, data: &[u8]) -> Result<(), PersistenceError> {
        self.medium.set_file(name, data)
    }

    fn has_file(&self, name: &str) -> Result<bool, PersistenceError> {
        self.medium.has_file(name)
    }

    fn remove_file(&self, name: &str) -> Result<(), PersistenceError> {
        self.medium.remove_file(name)
    }
}

/// Records every `(old, new)` pair a store delivers.
#[derive(Clone, Default)]
pub struct ChangeRecorder {
    changes: Arc<Mutex<Vec<(Config, Config)>>>,
}

impl ChangeRecorder {
    pub fn attach(store: &ConfigStore) -> Self {
        let recorder = Self::default();
        let changes = recorder.changes.clone();
        store.add_listener(move |old, new| changes.lock().push((old.clone(), new.clone())));
        recorder
    }

    pub fn count(&self) -> usize {
        self.changes.lock().len()
    }

    pub fn changes(&self) -> Vec<(Config, Config)> {
        self.changes.lock().clone()
    }

    pub fn last(&self) -> Option<(Config, Config)> {
        self.changes.lock().last().cloned()
    }
}

/// Poll `check` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    check()
}
