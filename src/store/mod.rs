//! Configuration store.
//!
//! # Data Flow
//! ```text
//! ConfigStore::open(dsn)
//!     → dsn.rs picks a backend (memory, file, sqlite)
//!     → backend.load() → common.rs pipeline → active document
//!     → file backends start a watcher
//!
//! set(config)
//!     → common.rs: desanitize → defaults → repair → overrides → validate
//!     → backend.persist() → publish → listeners.rs dispatcher
//!
//! watcher event
//!     → under the writer lock: backend.load(), skipped if the bytes equal
//!       what we last read or wrote
//!     → common.rs pipeline (no-op when the document is unchanged)
//! ```
//!
//! # Design Decisions
//! - Readers never block: the active document sits behind an `ArcSwap`
//! - One writer at a time; listener delivery is ordered by a single thread
//! - A failed load or set leaves the active document untouched

pub mod backend;
pub mod common;
pub mod database;
pub mod dsn;
pub mod file;
pub mod listeners;
pub mod memory;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::env::{OverriddenFields, DEFAULT_ENV_PREFIX};
use crate::config::watcher::ConfigWatcher;
use crate::config::{validate_config, Config, Environment};
use crate::error::{PersistenceError, StoreError, StoreResult};
use crate::observability::metrics;

pub use backend::Backend;
pub use common::LoadOutcome;
pub use database::{DatabaseBackend, SqliteTarget, DEFAULT_MAX_WRITE_LENGTH};
pub use dsn::StoreDsn;
pub use file::FileBackend;
pub use listeners::ListenerId;
pub use memory::MemoryBackend;

use common::{CommonStore, Medium, Pipeline, SyncOutcome};

/// Behaviour switches shared by every backend.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Reload when the backing file is edited externally.
    pub watch: bool,
    /// Reject `set` and never write back repairs.
    pub read_only: bool,
    pub allow_environment_overrides: bool,
    pub skip_validation: bool,
    /// Variables consulted for overrides.
    pub environment: Environment,
    pub env_prefix: String,
    /// Write ceiling for the database backend.
    pub max_write_length: usize,
    /// How long SQLite waits on a locked database.
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            watch: true,
            read_only: false,
            allow_environment_overrides: true,
            skip_validation: false,
            environment: Environment::default(),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            max_write_length: DEFAULT_MAX_WRITE_LENGTH,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

struct StoreInner {
    core: CommonStore,
    backend: Box<dyn Backend>,
    options: StoreOptions,
    closed: AtomicBool,
}

/// Holds the active configuration and keeps it in sync with its backend.
pub struct ConfigStore {
    inner: Arc<StoreInner>,
    watcher: Mutex<Option<ConfigWatcher>>,
}

impl ConfigStore {
    /// Open the store named by `dsn`. See [`StoreDsn`] for the accepted forms.
    pub fn open(dsn: &str, options: StoreOptions) -> StoreResult<Self> {
        let backend: Box<dyn Backend> = match StoreDsn::parse(dsn)? {
            StoreDsn::Memory => Box::new(MemoryBackend::new()),
            StoreDsn::File(path) => Box::new(FileBackend::new(path)?),
            StoreDsn::Sqlite(target) => Box::new(DatabaseBackend::open(
                target,
                options.max_write_length,
                options.busy_timeout,
            )?),
        };
        Self::with_backend(backend, options)
    }

    /// An in-process store starting from defaults, without a watcher.
    pub fn memory() -> StoreResult<Self> {
        Self::with_backend(
            Box::new(MemoryBackend::new()),
            StoreOptions {
                watch: false,
                ..StoreOptions::default()
            },
        )
    }

    /// Load from `backend` and, when asked and supported, start watching it.
    pub fn with_backend(backend: Box<dyn Backend>, options: StoreOptions) -> StoreResult<Self> {
        let inner = Arc::new(StoreInner {
            core: CommonStore::new().map_err(StoreError::Thread)?,
            backend,
            options,
            closed: AtomicBool::new(false),
        });

        let outcome = inner.load_from_backend()?;
        tracing::info!(
            store = %inner.backend.describe(),
            saved = outcome.saved,
            "Configuration loaded"
        );

        let watcher = match inner.backend.watch_path() {
            Some(path) if inner.options.watch => {
                let weak: Weak<StoreInner> = Arc::downgrade(&inner);
                let watcher = ConfigWatcher::new(path, move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.reload_if_changed();
                    }
                })?;
                Some(watcher)
            }
            _ => None,
        };

        Ok(Self {
            inner,
            watcher: Mutex::new(watcher),
        })
    }

    /// A copy of the active document.
    pub fn get(&self) -> Config {
        (*self.inner.core.snapshot()).clone()
    }

    /// The active document, shared.
    pub fn snapshot(&self) -> Arc<Config> {
        self.inner.core.snapshot()
    }

    /// Validate, persist and publish `config`, returning the new active document.
    pub fn set(&self, config: Config) -> StoreResult<Config> {
        self.inner.ensure_open()?;
        if self.inner.options.read_only {
            metrics::record_set("read_only");
            return Err(StoreError::ReadOnly);
        }

        let result = self
            .inner
            .core
            .set(config, &self.inner.pipeline(), &|c: &Config| self.inner.write(c));
        match &result {
            Ok(_) => {
                metrics::record_set("ok");
                tracing::info!(store = %self.inner.backend.describe(), "Configuration saved");
            }
            Err(e) => {
                metrics::record_set(outcome_label(e));
                tracing::warn!(error = %e, "Rejected configuration update");
            }
        }
        result.map(|config| (*config).clone())
    }

    /// Re-read the backend and apply what it holds.
    pub fn reload(&self) -> StoreResult<LoadOutcome> {
        self.inner.ensure_open()?;
        self.inner.load_from_backend()
    }

    /// Reload unless the backend still holds the bytes this store last
    /// read or wrote. Returns whether a load ran.
    pub fn sync(&self) -> StoreResult<bool> {
        self.inner.ensure_open()?;
        self.inner.sync()
    }

    /// Register `listener`, called with `(old, new)` after each change.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Config, &Config) + Send + Sync + 'static,
    {
        self.inner.core.add_listener(Arc::new(listener))
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.core.remove_listener(id)
    }

    pub fn listener_count(&self) -> usize {
        self.inner.core.listener_count()
    }

    /// Block until every queued change has reached the listeners.
    ///
    /// Must not be called from inside a listener.
    pub fn flush_listeners(&self) {
        self.inner.core.flush_listeners();
    }

    /// Paths whose active value came from the environment.
    pub fn environment_overrides(&self) -> OverriddenFields {
        self.inner.core.environment_overrides()
    }

    pub fn is_read_only(&self) -> bool {
        self.inner.options.read_only
    }

    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .is_some_and(ConfigWatcher::is_watching)
    }

    pub fn describe(&self) -> String {
        self.inner.backend.describe()
    }

    pub fn get_file(&self, name: &str) -> StoreResult<Vec<u8>> {
        Ok(self.inner.backend.get_file(name)?)
    }

    pub fn set_file(&self, name: &str, data: &[u8]) -> StoreResult<()> {
        self.inner.ensure_open()?;
        if self.inner.options.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(self.inner.backend.set_file(name, data)?)
    }

    pub fn has_file(&self, name: &str) -> StoreResult<bool> {
        Ok(self.inner.backend.has_file(name)?)
    }

    pub fn remove_file(&self, name: &str) -> StoreResult<()> {
        self.inner.ensure_open()?;
        if self.inner.options.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(self.inner.backend.remove_file(name)?)
    }

    /// Stop watching, deliver queued notifications and refuse further writes.
    ///
    /// Idempotent. No listener runs after this returns. Must not be called
    /// from inside a listener.
    pub fn close(&self) -> StoreResult<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(watcher) = self.watcher.lock().take() {
            watcher.close();
        }
        self.inner.core.close();
        tracing::debug!(store = %self.inner.backend.describe(), "Configuration store closed");
        Ok(())
    }
}

impl Drop for ConfigStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl StoreInner {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline {
            allow_environment_overrides: self.options.allow_environment_overrides,
            environment: &self.options.environment,
            env_prefix: &self.options.env_prefix,
            validate: if self.options.skip_validation {
                None
            } else {
                Some(validate_config)
            },
        }
    }

    fn write(&self, config: &Config) -> Result<Option<Vec<u8>>, PersistenceError> {
        self.backend.persist(config).map(Some)
    }

    /// Write back repairs unless the store is read-only.
    fn write_back(&self, config: &Config) -> Result<Option<Vec<u8>>, PersistenceError> {
        if self.options.read_only {
            tracing::debug!("Read-only store, not writing back repaired configuration");
            return Ok(None);
        }
        self.write(config)
    }

    fn with_medium<R>(&self, f: impl FnOnce(&Medium<'_>) -> R) -> R {
        let read = || self.backend.load();
        let initial = || {
            tracing::info!(store = %self.backend.describe(), "No configuration found, initializing defaults");
            self.backend.initial_config()
        };
        f(&Medium {
            read: &read,
            codec: self.backend.codec(),
            initial: &initial,
        })
    }

    fn load_from_backend(&self) -> StoreResult<LoadOutcome> {
        let result = self.with_medium(|medium| {
            self.core
                .load(medium, &self.pipeline(), &|c: &Config| self.write_back(c))
        });
        match &result {
            Ok(outcome) => metrics::record_load(if outcome.changed { "changed" } else { "unchanged" }),
            Err(e) => metrics::record_load(outcome_label(e)),
        }
        result
    }

    fn sync(&self) -> StoreResult<bool> {
        let result = self.with_medium(|medium| {
            self.core
                .sync(medium, &self.pipeline(), &|c: &Config| self.write_back(c))
        });
        match result {
            Ok(SyncOutcome::Empty) => {
                // Mid-write or deleted; the next event carries the content.
                tracing::debug!(store = %self.backend.describe(), "Ignoring change event for empty medium");
                Ok(false)
            }
            Ok(SyncOutcome::Unchanged) => {
                tracing::debug!(store = %self.backend.describe(), "Ignoring change event for our own write");
                metrics::record_watch_event("echo");
                Ok(false)
            }
            Ok(SyncOutcome::Loaded(outcome)) => {
                metrics::record_watch_event("external");
                metrics::record_load(if outcome.changed { "changed" } else { "unchanged" });
                Ok(true)
            }
            Err(e) => {
                metrics::record_watch_event("external");
                metrics::record_load(outcome_label(&e));
                Err(e)
            }
        }
    }

    /// Watcher callback. Errors keep the current document.
    fn reload_if_changed(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        match self.sync() {
            Ok(true) => tracing::info!(store = %self.backend.describe(), "Configuration reloaded"),
            Ok(false) => {}
            Err(e) => tracing::error!(
                store = %self.backend.describe(),
                error = %e,
                "Failed to reload configuration, keeping current configuration"
            ),
        }
    }
}

fn outcome_label(err: &StoreError) -> &'static str {
    match err {
        StoreError::Deserialization(_) => "deserialization_error",
        StoreError::Validation(_) => "validation_error",
        StoreError::Persistence(_) => "persistence_error",
        StoreError::ReadOnly => "read_only",
        _ => "error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting(store: &ConfigStore) -> Arc<AtomicUsize> {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        store.add_listener(move |_, _| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        calls
    }

    #[test]
    fn test_memory_store_starts_from_defaults() {
        let store = ConfigStore::memory().unwrap();
        let cfg = store.snapshot();
        assert_eq!(cfg.sql_settings.data_source.as_deref(), Some("app.db"));
        assert!(cfg.file_settings.public_link_salt.is_some());
        assert!(!store.is_watching());
    }

    #[test]
    fn test_set_then_get() {
        let store = ConfigStore::memory().unwrap();
        let mut cfg = store.get();
        cfg.service_settings.site_url = "https://chat.example.com/".into();

        let effective = store.set(cfg).unwrap();
        assert_eq!(effective.service_settings.site_url, "https://chat.example.com");
        assert_eq!(store.get(), effective);
    }

    #[test]
    fn test_read_only_rejects_set() {
        let store = ConfigStore::with_backend(
            Box::new(MemoryBackend::new()),
            StoreOptions {
                watch: false,
                read_only: true,
                ..StoreOptions::default()
            },
        )
        .unwrap();
        let cfg = store.get();
        assert!(matches!(store.set(cfg), Err(StoreError::ReadOnly)));
        assert!(matches!(store.set_file("a", b"b"), Err(StoreError::ReadOnly)));
    }

    #[test]
    fn test_sync_ignores_own_write() {
        let store = ConfigStore::memory().unwrap();
        let calls = counting(&store);

        let mut cfg = store.get();
        cfg.service_settings.enable_developer = true;
        store.set(cfg).unwrap();

        assert!(!store.sync().unwrap());
        store.close().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closed_store_refuses_writes() {
        let store = ConfigStore::memory().unwrap();
        store.close().unwrap();
        store.close().unwrap();
        let cfg = store.get();
        assert!(matches!(store.set(cfg), Err(StoreError::Closed)));
        assert!(matches!(store.reload(), Err(StoreError::Closed)));
    }

    #[test]
    fn test_open_rejects_bad_dsn() {
        let result = ConfigStore::open("redis://localhost", StoreOptions::default());
        assert!(matches!(result, Err(StoreError::InvalidDsn { .. })));
    }
}
