//! Backend-independent store core.
//!
//! Owns the active document, the writer lock and the listener registry. The
//! backends only move bytes; every load and set goes through the pipeline
//! here: decode, defaults, repair, environment overrides, validation, then
//! persist, publish and notify.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;

use crate::config::env::{apply_environment_overrides, remove_environment_overrides, OverriddenFields};
use crate::config::loader::unmarshal_config;
use crate::config::validation::Validator;
use crate::config::{fix_config, Codec, Config, Environment};
use crate::error::{PersistenceError, StoreError, StoreResult};
use crate::store::listeners::{Listener, ListenerId, Listeners};

/// How documents are turned into the active document.
#[derive(Debug, Clone, Copy)]
pub struct Pipeline<'a> {
    pub allow_environment_overrides: bool,
    pub environment: &'a Environment,
    pub env_prefix: &'a str,
    /// `None` skips validation.
    pub validate: Option<Validator>,
}

/// Where a load reads its document from.
pub struct Medium<'a> {
    /// Current bytes, or `None` when nothing is stored.
    pub read: &'a dyn Fn() -> Result<Option<Vec<u8>>, PersistenceError>,
    pub codec: Codec,
    /// Document to start from when the medium is empty.
    pub initial: &'a dyn Fn() -> Config,
}

/// Writes a document back to the medium.
///
/// Returns the bytes now on the medium, or `None` when nothing was written.
pub type Persist<'a> = &'a dyn Fn(&Config) -> Result<Option<Vec<u8>>, PersistenceError>;

/// Result of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOutcome {
    /// The document was written back to the medium.
    pub saved: bool,
    /// The active document was replaced and listeners notified.
    pub changed: bool,
}

/// Result of a sync against the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing on the medium, usually a write in progress.
    Empty,
    /// The medium still holds the bytes last read or written.
    Unchanged,
    Loaded(LoadOutcome),
}

struct WriterState {
    /// Last document read from or written to the medium, without overrides.
    persisted: Config,
    /// Bytes most recently read from or written to the medium.
    synced: Option<Vec<u8>>,
}

pub struct CommonStore {
    active: ArcSwap<Config>,
    overridden: ArcSwap<OverriddenFields>,
    writer: Mutex<WriterState>,
    listeners: Listeners,
}

impl CommonStore {
    pub fn new() -> std::io::Result<Self> {
        let mut initial = Config::default();
        initial.set_defaults();
        Ok(Self {
            active: ArcSwap::from_pointee(initial.clone()),
            overridden: ArcSwap::from_pointee(OverriddenFields::new()),
            writer: Mutex::new(WriterState {
                persisted: initial,
                synced: None,
            }),
            listeners: Listeners::new()?,
        })
    }

    /// Current active document.
    pub fn snapshot(&self) -> Arc<Config> {
        self.active.load_full()
    }

    /// Paths whose active value came from the environment.
    pub fn environment_overrides(&self) -> OverriddenFields {
        (**self.overridden.load()).clone()
    }

    /// Read the medium and make its document the active one.
    ///
    /// The read happens under the writer lock, so a concurrent `set` is
    /// either fully before or fully after it. When the input needed repairs
    /// or generated defaults, the repaired document is written back through
    /// `persist` before anything is published. Nothing changes on error.
    pub fn load(
        &self,
        medium: &Medium<'_>,
        pipeline: &Pipeline<'_>,
        persist: Persist<'_>,
    ) -> StoreResult<LoadOutcome> {
        let mut state = self.writer.lock();
        let loaded = (medium.read)()?;
        self.apply(&mut state, loaded, medium, pipeline, persist)
    }

    /// Like `load`, but skips an empty medium and bytes this store already
    /// holds.
    pub fn sync(
        &self,
        medium: &Medium<'_>,
        pipeline: &Pipeline<'_>,
        persist: Persist<'_>,
    ) -> StoreResult<SyncOutcome> {
        let mut state = self.writer.lock();
        let loaded = (medium.read)()?;
        if loaded.as_ref().map_or(true, Vec::is_empty) {
            return Ok(SyncOutcome::Empty);
        }
        if state.synced == loaded {
            return Ok(SyncOutcome::Unchanged);
        }
        self.apply(&mut state, loaded, medium, pipeline, persist)
            .map(SyncOutcome::Loaded)
    }

    fn apply(
        &self,
        state: &mut WriterState,
        loaded: Option<Vec<u8>>,
        medium: &Medium<'_>,
        pipeline: &Pipeline<'_>,
        persist: Persist<'_>,
    ) -> StoreResult<LoadOutcome> {
        let on_medium = loaded.filter(|bytes| !bytes.is_empty());
        let (mut document, mut needs_save) = match &on_medium {
            Some(bytes) => (
                unmarshal_config(bytes, medium.codec).map_err(StoreError::Deserialization)?,
                false,
            ),
            None => ((medium.initial)(), true),
        };

        // Generated defaults must reach the medium or every load makes new ones.
        let decoded = document.clone();
        document.inherit_generated(&state.persisted);
        document.set_defaults();
        needs_save |= document != decoded;
        needs_save |= fix_config(&mut document);

        let (effective, overridden) = effective_config(&document, pipeline)?;

        let written = if needs_save { persist(&document)? } else { None };
        let saved = written.is_some();
        state.synced = written.or(on_medium);
        state.persisted = document;
        self.overridden.store(Arc::new(overridden));

        let old = self.active.load_full();
        if *old == effective {
            return Ok(LoadOutcome { saved, changed: false });
        }

        let new = Arc::new(effective);
        self.active.store(new.clone());
        self.listeners.notify(old, new);
        Ok(LoadOutcome { saved, changed: true })
    }

    /// Replace the active document with `candidate`.
    ///
    /// Secrets still holding the sanitized placeholder keep their active
    /// values. Overridden fields are persisted with the values the medium
    /// had, never the environment's. Listeners are always notified.
    pub fn set(
        &self,
        candidate: Config,
        pipeline: &Pipeline<'_>,
        persist: Persist<'_>,
    ) -> StoreResult<Arc<Config>> {
        let mut state = self.writer.lock();
        let old = self.active.load_full();

        let mut candidate = candidate;
        candidate.desanitize(&old);
        candidate.inherit_generated(&state.persisted);
        candidate.set_defaults();
        fix_config(&mut candidate);

        let to_persist = if pipeline.allow_environment_overrides {
            remove_environment_overrides(&candidate, &state.persisted, &self.overridden.load())
                .map_err(StoreError::Validation)?
        } else {
            candidate
        };

        let (effective, overridden) = effective_config(&to_persist, pipeline)?;

        if let Some(bytes) = persist(&to_persist)? {
            state.synced = Some(bytes);
        }

        state.persisted = to_persist;
        self.overridden.store(Arc::new(overridden));

        let new = Arc::new(effective);
        self.active.store(new.clone());
        self.listeners.notify(old, new.clone());
        Ok(new)
    }

    pub fn add_listener(&self, listener: Listener) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Wait until queued notifications have been delivered.
    pub fn flush_listeners(&self) {
        self.listeners.flush();
    }

    /// Deliver what is queued and stop notifying.
    pub fn close(&self) {
        self.listeners.close();
    }
}

/// Apply overrides, repair and validate a document about to become active.
fn effective_config(
    config: &Config,
    pipeline: &Pipeline<'_>,
) -> StoreResult<(Config, OverriddenFields)> {
    let (mut effective, overridden) = if pipeline.allow_environment_overrides {
        apply_environment_overrides(config, pipeline.environment, pipeline.env_prefix)
            .map_err(StoreError::Validation)?
    } else {
        (config.clone(), OverriddenFields::new())
    };
    fix_config(&mut effective);

    if let Some(validate) = pipeline.validate {
        validate(&effective).map_err(StoreError::Validation)?;
    }
    Ok((effective, overridden))
}
