//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! store, watcher, listeners produce:
//!     → logging.rs (tracing events, filtered by RUST_LOG)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape endpoint (daemon only, opt-in)
//! ```

pub mod logging;
pub mod metrics;
