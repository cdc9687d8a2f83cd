//! Error types returned by the store and the field filter.

use thiserror::Error;

use crate::config::loader::{join_errors, CodecError};
use crate::config::validation::ValidationError;

/// Failure writing to or reading from a backend medium.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to serialize: {0}")]
    Encode(#[from] CodecError),

    /// The serialized value exceeds the medium's write ceiling.
    #[error("value is too long: {actual} > {limit} bytes")]
    TooLarge { limit: usize, actual: usize },

    #[error("config file {0:?} not found")]
    FileNotFound(String),
}

/// Errors surfaced by store and filter operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Bytes read from a backend could not be decoded.
    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] CodecError),

    /// The document is well formed but violates one or more invariants.
    #[error("invalid configuration: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("failed to persist configuration: {0}")]
    Persistence(#[from] PersistenceError),

    /// The caller may not change this field.
    #[error("permission denied to modify {path}")]
    PermissionDenied { path: String },

    /// The caller referenced a path that is not part of the schema.
    #[error("unknown setting {path}")]
    UnknownSetting { path: String },

    #[error("configuration is read-only")]
    ReadOnly,

    #[error("invalid DSN {dsn:?}: {reason}")]
    InvalidDsn { dsn: String, reason: String },

    #[error("failed to watch configuration: {0}")]
    Watch(#[from] notify::Error),

    #[error("store is closed")]
    Closed,

    #[error("failed to start background thread: {0}")]
    Thread(#[source] std::io::Error),
}

impl StoreError {
    pub fn validation_errors(&self) -> Option<&[ValidationError]> {
        match self {
            StoreError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
