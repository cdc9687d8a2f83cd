//! The seam between the store core and a storage medium.

use std::path::Path;

use crate::config::{Codec, Config};
use crate::error::PersistenceError;

/// A medium that documents are read from and written to.
///
/// Implementations only move bytes. Decoding, validation, locking and
/// notification live in the store core.
pub trait Backend: Send + Sync {
    /// Human readable location, used in logs.
    fn describe(&self) -> String;

    /// Encoding of the bytes returned by `load`.
    fn codec(&self) -> Codec {
        Codec::Json
    }

    /// Current bytes on the medium, or `None` if nothing was stored yet.
    fn load(&self) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Write `config` and return the exact bytes now on the medium.
    fn persist(&self, config: &Config) -> Result<Vec<u8>, PersistenceError>;

    /// Document used when the medium is empty.
    fn initial_config(&self) -> Config {
        let mut config = Config::default();
        config.set_defaults();
        config
    }

    /// File to watch for external edits, if the medium supports it.
    fn watch_path(&self) -> Option<&Path> {
        None
    }

    fn get_file(&self, name: &str) -> Result<Vec<u8>, PersistenceError>;

    fn set_file(&self, name: &str, data: &[u8]) -> Result<(), PersistenceError>;

    fn has_file(&self, name: &str) -> Result<bool, PersistenceError>;

    /// Removing a file that does not exist succeeds.
    fn remove_file(&self, name: &str) -> Result<(), PersistenceError>;
}
