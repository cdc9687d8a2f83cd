//! Lifecycle management for the daemon.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → close the store → exit
//!     SIGHUP → reload the store from its backend
//! ```

pub mod signals;

pub use signals::{Signal, Signals};
