//! Settings document and the machinery around it.
//!
//! # Data Flow
//! ```text
//! raw bytes (JSON/TOML)
//!     → loader.rs (decode)
//!     → Config::set_defaults
//!     → normalize.rs (fix_config, idempotent repairs)
//!     → env.rs (environment overrides)
//!     → validation.rs (semantic checks)
//!     → Config (validated, immutable once published)
//!
//! On file change:
//!     watcher.rs detects change
//!     → store reloads through the same pipeline
//! ```
//!
//! # Design Decisions
//! - Config is immutable once published; changes replace it wholesale
//! - All fields have defaults to allow minimal documents
//! - fields.rs is the single table of leaf paths, access tags and secrets

pub mod env;
pub mod fields;
pub mod loader;
pub mod normalize;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use env::Environment;
pub use fields::{FieldSpec, FAKE_SETTING, FIELDS};
pub use loader::Codec;
pub use normalize::fix_config;
pub use schema::Config;
pub use validation::{validate_config, ValidationError};
