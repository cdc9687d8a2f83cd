//! Metrics collection and exposition.
//!
//! # Metrics
//! - `config_store_loads_total` (counter): loads by outcome
//! - `config_store_sets_total` (counter): set calls by outcome
//! - `config_store_watch_events_total` (counter): watcher events by kind (`external`, `echo`)
//! - `config_store_listeners` (gauge): registered listeners
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Serve a Prometheus scrape endpoint on `addr`. Must run inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_load(outcome: &'static str) {
    ::metrics::counter!("config_store_loads_total", "outcome" => outcome).increment(1);
}

pub fn record_set(outcome: &'static str) {
    ::metrics::counter!("config_store_sets_total", "outcome" => outcome).increment(1);
}

pub fn record_watch_event(kind: &'static str) {
    ::metrics::counter!("config_store_watch_events_total", "kind" => kind).increment(1);
}

pub fn set_listener_count(count: usize) {
    ::metrics::gauge!("config_store_listeners").set(count as f64);
}
