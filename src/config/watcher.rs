//! Configuration file watcher for hot reload.
//!
//! The watcher subscribes to the directory containing the file (editors and
//! atomic writers replace the file, which would drop a watch on the file
//! itself) and invokes a callback on a dedicated thread for every write or
//! create event on the file.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

enum WatchMessage {
    Changed,
    Stop,
}

/// A watcher that monitors a configuration file for changes.
pub struct ConfigWatcher {
    path: PathBuf,
    inner: Mutex<Option<Running>>,
}

struct Running {
    watcher: RecommendedWatcher,
    closing: Arc<AtomicBool>,
    stop_tx: mpsc::UnboundedSender<WatchMessage>,
    handle: JoinHandle<()>,
}

impl ConfigWatcher {
    /// Start watching `path`, calling `on_change` for every change event.
    ///
    /// Fails if the containing directory cannot be watched.
    pub fn new<F>(path: &Path, on_change: F) -> Result<Self, notify::Error>
    where
        F: Fn() + Send + 'static,
    {
        let path = path.to_path_buf();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = path.file_name().map(|n| n.to_os_string());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let event_tx = tx.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if !(event.kind.is_modify() || event.kind.is_create()) {
                        return;
                    }
                    let ours = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                    if ours {
                        let _ = event_tx.send(WatchMessage::Changed);
                    }
                }
                Err(e) => tracing::error!("Watch error: {:?}", e),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;

        let closing = Arc::new(AtomicBool::new(false));
        let stopped = closing.clone();
        let watched = path.clone();
        let handle = std::thread::Builder::new()
            .name("config-watcher".into())
            .spawn(move || {
                while let Some(msg) = rx.blocking_recv() {
                    match msg {
                        WatchMessage::Changed if stopped.load(Ordering::Acquire) => break,
                        WatchMessage::Changed => {
                            tracing::info!(path = ?watched, "Config file change detected, reloading...");
                            on_change();
                        }
                        WatchMessage::Stop => break,
                    }
                }
                tracing::debug!(path = ?watched, "Config watcher stopped");
            })
            .map_err(notify::Error::io)?;

        tracing::info!(path = ?path, "Config watcher started");

        Ok(Self {
            path,
            inner: Mutex::new(Some(Running {
                watcher,
                closing,
                stop_tx: tx,
                handle,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_watching(&self) -> bool {
        self.inner.lock().is_some()
    }

    /// Stop the subscription and wait for the callback thread to exit.
    ///
    /// Idempotent. No callback runs after this returns.
    pub fn close(&self) {
        let Some(running) = self.inner.lock().take() else {
            return;
        };
        let Running {
            mut watcher,
            closing,
            stop_tx,
            handle,
        } = running;

        closing.store(true, Ordering::Release);
        if let Err(e) = watcher.unwatch(&self.watched_dir()) {
            tracing::debug!("Failed to unwatch config directory: {}", e);
        }
        drop(watcher);
        let _ = stop_tx.send(WatchMessage::Stop);
        if handle.join().is_err() {
            tracing::error!(path = ?self.path, "Config watcher thread panicked");
        }
    }

    fn watched_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.close();
    }
}
