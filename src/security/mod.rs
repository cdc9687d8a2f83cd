//! Permission-scoped access to the settings document.
//!
//! # Data Flow
//! ```text
//! Session (caller roles)
//!     → resolver.rs (does the caller hold permission P?)
//!     → access_control.rs (walk fields.rs, decide per leaf)
//!     → read projection / checked patch
//! ```
//!
//! # Design Decisions
//! - The catalog is built once and shared by reference
//! - The filter holds no state; same inputs give the same output
//! - Unknown permission ids are logged and skipped, never fatal

pub mod access_control;
pub mod permissions;
pub mod resolver;

pub use access_control::ConfigFilter;
pub use permissions::{AccessType, Permission, PermissionCatalog};
pub use resolver::{PermissionResolver, RolePermissions, Session};
