//! In-process backend, mostly for tests.

use std::collections::HashMap;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::config::loader::marshal_config;
use crate::config::{Codec, Config};
use crate::error::PersistenceError;
use crate::store::backend::Backend;

/// Keeps the last persisted document in a slot.
pub struct MemoryBackend {
    saved: Mutex<Option<Config>>,
    files: DashMap<String, Vec<u8>>,
}

impl MemoryBackend {
    /// An empty medium; the store will initialize it with defaults.
    pub fn new() -> Self {
        Self {
            saved: Mutex::new(None),
            files: DashMap::new(),
        }
    }

    /// A medium already holding `config` and `files`.
    pub fn with_initial(config: Config, files: HashMap<String, Vec<u8>>) -> Self {
        Self {
            saved: Mutex::new(Some(config)),
            files: files.into_iter().collect(),
        }
    }

    /// The document as last written.
    pub fn saved(&self) -> Option<Config> {
        self.saved.lock().clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for MemoryBackend {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError> {
        match self.saved.lock().as_ref() {
            Some(config) => Ok(Some(marshal_config(config, Codec::Json)?)),
            None => Ok(None),
        }
    }

    fn persist(&self, config: &Config) -> Result<Vec<u8>, PersistenceError> {
        let bytes = marshal_config(config, Codec::Json)?;
        *self.saved.lock() = Some(config.clone());
        Ok(bytes)
    }

    fn get_file(&self, name: &str) -> Result<Vec<u8>, PersistenceError> {
        self.files
            .get(name)
            .map(|data| data.value().clone())
            .ok_or_else(|| PersistenceError::FileNotFound(name.to_string()))
    }

    fn set_file(&self, name: &str, data: &[u8]) -> Result<(), PersistenceError> {
        self.files.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn has_file(&self, name: &str) -> Result<bool, PersistenceError> {
        Ok(self.files.contains_key(name))
    }

    fn remove_file(&self, name: &str) -> Result<(), PersistenceError> {
        self.files.remove(name);
        Ok(())
    }
}
