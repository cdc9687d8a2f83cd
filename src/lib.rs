//! Dynamic configuration store with permission-scoped field access.
//!
//! A [`ConfigStore`] keeps one validated settings document active, persists
//! changes to a memory, file or SQLite backend, reloads on external edits
//! and tells listeners about every change. [`security::ConfigFilter`] decides
//! which fields a caller may see or change.

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod security;
pub mod store;

pub use config::Config;
pub use error::{PersistenceError, StoreError, StoreResult};
pub use store::{ConfigStore, ListenerId, StoreOptions};
