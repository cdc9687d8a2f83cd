//! Configuration store daemon.
//!
//! ```text
//!   CONFIG_DSN ──▶ ConfigStore ──▶ backend (file / sqlite / memory)
//!                      │   ▲
//!                      │   └── watcher (file edits), SIGHUP (reload)
//!                      ▼
//!                  listeners ──▶ log of changed fields
//! ```
//!
//! Keeps the configuration loaded and current until SIGINT or SIGTERM.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;

use config_store::config::env::DEFAULT_ENV_PREFIX;
use config_store::config::fields::changed_fields;
use config_store::config::Environment;
use config_store::lifecycle::{Signal, Signals};
use config_store::observability::{logging, metrics};
use config_store::{ConfigStore, StoreOptions};

#[derive(Parser)]
#[command(name = "config-store")]
#[command(about = "Keeps a configuration document loaded, validated and current", long_about = None)]
struct Args {
    /// Store DSN: a file path, sqlite://<path>, sqlite::memory: or memory:
    #[arg(short, long, env = "CONFIG_DSN", default_value = "config.json")]
    config: String,

    /// Do not reload when the config file changes on disk
    #[arg(long)]
    disable_config_watch: bool,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_address: Option<SocketAddr>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Prefix of environment variables that override settings
    #[arg(long, default_value = DEFAULT_ENV_PREFIX)]
    env_prefix: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    logging::init_logging(&args.log_level);

    tracing::info!("config-store v{} starting", env!("CARGO_PKG_VERSION"));

    if let Some(addr) = args.metrics_address {
        metrics::init_metrics(addr);
    }

    let options = StoreOptions {
        watch: !args.disable_config_watch,
        environment: Environment::from_process(),
        env_prefix: args.env_prefix,
        ..StoreOptions::default()
    };

    let store = {
        let dsn = args.config.clone();
        tokio::task::spawn_blocking(move || ConfigStore::open(&dsn, options)).await??
    };
    let store = Arc::new(store);

    tracing::info!(
        store = %store.describe(),
        watching = store.is_watching(),
        overrides = store.environment_overrides().len(),
        "Configuration store ready"
    );

    let listener = store.add_listener(|old, new| {
        let (Ok(old), Ok(new)) = (serde_json::to_value(old), serde_json::to_value(new)) else {
            return;
        };
        let changed = changed_fields(&old, &new);
        if changed.is_empty() {
            tracing::info!("Configuration saved without changes");
        } else {
            tracing::info!(fields = ?changed, "Configuration changed");
        }
    });

    let mut signals = Signals::new()?;
    loop {
        match signals.recv().await {
            Signal::Reload => {
                let store = store.clone();
                match tokio::task::spawn_blocking(move || store.reload()).await? {
                    Ok(outcome) => tracing::info!(changed = outcome.changed, "Configuration reloaded"),
                    Err(e) => tracing::error!(
                        error = %e,
                        "Failed to reload configuration, keeping current configuration"
                    ),
                }
            }
            Signal::Shutdown => break,
        }
    }

    tracing::info!("Shutting down");
    store.remove_listener(listener);
    let closing = store.clone();
    tokio::task::spawn_blocking(move || closing.close()).await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
