//! Change listeners and their dispatcher.
//!
//! Writers enqueue `(old, new)` pairs while holding the store's writer lock,
//! so the queue order is the order in which changes happened. Each change
//! carries the listeners registered when it was queued. A single dispatcher
//! thread drains the queue and calls them in registration order. Listeners
//! therefore never run concurrently with each other and may call back into
//! the store.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc};
use std::thread::JoinHandle;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::observability::metrics;

/// Callback invoked with the previous and the new active document.
pub type Listener = Arc<dyn Fn(&Config, &Config) + Send + Sync>;

/// Opaque handle returned by `add_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

enum Dispatch {
    Change {
        old: Arc<Config>,
        new: Arc<Config>,
        targets: Vec<(ListenerId, Listener)>,
    },
    Flush(std_mpsc::SyncSender<()>),
}

pub(crate) struct Listeners {
    next_id: AtomicU64,
    registry: DashMap<ListenerId, Listener>,
    queue: Mutex<Option<mpsc::UnboundedSender<Dispatch>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Listeners {
    pub(crate) fn new() -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Dispatch>();

        let handle = std::thread::Builder::new()
            .name("config-listeners".into())
            .spawn(move || {
                while let Some(msg) = rx.blocking_recv() {
                    match msg {
                        Dispatch::Change { old, new, targets } => deliver(&targets, &old, &new),
                        Dispatch::Flush(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
            })?;

        Ok(Self {
            next_id: AtomicU64::new(1),
            registry: DashMap::new(),
            queue: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(handle)),
        })
    }

    pub(crate) fn add(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.registry.insert(id, listener);
        metrics::set_listener_count(self.registry.len());
        id
    }

    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let removed = self.registry.remove(&id).is_some();
        metrics::set_listener_count(self.registry.len());
        removed
    }

    pub(crate) fn len(&self) -> usize {
        self.registry.len()
    }

    fn snapshot(&self) -> Vec<(ListenerId, Listener)> {
        let mut snapshot: Vec<(ListenerId, Listener)> = self
            .registry
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        snapshot.sort_by_key(|(id, _)| *id);
        snapshot
    }

    /// Queue a change for the listeners registered right now. Must be
    /// called under the writer lock.
    pub(crate) fn notify(&self, old: Arc<Config>, new: Arc<Config>) {
        let targets = self.snapshot();
        if targets.is_empty() {
            return;
        }
        match self.queue.lock().as_ref() {
            Some(tx) => {
                if tx.send(Dispatch::Change { old, new, targets }).is_err() {
                    tracing::error!("Listener dispatcher is gone, dropping config change notification");
                }
            }
            None => tracing::warn!("Store closed, dropping config change notification"),
        }
    }

    /// Block until every change queued so far has been delivered.
    ///
    /// Must not be called from inside a listener.
    pub(crate) fn flush(&self) {
        let (ack_tx, ack_rx) = std_mpsc::sync_channel(1);
        let sent = match self.queue.lock().as_ref() {
            Some(tx) => tx.send(Dispatch::Flush(ack_tx)).is_ok(),
            None => false,
        };
        if sent {
            let _ = ack_rx.recv();
        }
    }

    /// Deliver pending changes, then stop the dispatcher. Idempotent.
    pub(crate) fn close(&self) {
        drop(self.queue.lock().take());
        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Listener dispatcher thread panicked");
            }
        }
    }
}

impl Drop for Listeners {
    fn drop(&mut self) {
        self.close();
    }
}

fn deliver(targets: &[(ListenerId, Listener)], old: &Config, new: &Config) {
    for (id, listener) in targets {
        if catch_unwind(AssertUnwindSafe(|| listener(old, new))).is_err() {
            tracing::error!(listener = %id, "Config listener panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configs() -> (Arc<Config>, Arc<Config>) {
        let old = Config::default();
        let mut new = old.clone();
        new.service_settings.enable_developer = true;
        (Arc::new(old), Arc::new(new))
    }

    #[test]
    fn test_delivers_in_registration_order() {
        let listeners = Listeners::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = seen.clone();
            listeners.add(Arc::new(move |_: &Config, _: &Config| seen.lock().push(n)));
        }

        let (old, new) = configs();
        listeners.notify(old, new);
        listeners.flush();
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_removed_listener_not_called() {
        let listeners = Listeners::new().unwrap();
        let calls = Arc::new(AtomicU64::new(0));
        let c = calls.clone();
        let id = listeners.add(Arc::new(move |_: &Config, _: &Config| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));

        let (old, new) = configs();
        listeners.notify(old, new);
        listeners.close();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let listeners = Listeners::new().unwrap();
        let calls = Arc::new(AtomicU64::new(0));
        listeners.add(Arc::new(|_: &Config, _: &Config| panic!("boom")));
        let c = calls.clone();
        listeners.add(Arc::new(move |_: &Config, _: &Config| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let (old, new) = configs();
        listeners.notify(old.clone(), new.clone());
        listeners.notify(new, old);
        listeners.close();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_close_drains_queue_and_is_idempotent() {
        let listeners = Listeners::new().unwrap();
        let calls = Arc::new(AtomicU64::new(0));
        let c = calls.clone();
        listeners.add(Arc::new(move |_: &Config, _: &Config| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        let (old, new) = configs();
        for _ in 0..5 {
            listeners.notify(old.clone(), new.clone());
        }
        listeners.close();
        listeners.close();
        assert_eq!(calls.load(Ordering::SeqCst), 5);

        listeners.notify(old, new);
        listeners.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_listener_added_after_notify_misses_that_change() {
        let listeners = Listeners::new().unwrap();
        let calls = Arc::new(AtomicU64::new(0));

        // Hold the dispatcher so the change is still queued when we register.
        let (gate_tx, gate_rx) = std_mpsc::channel::<()>();
        let gate_rx = Mutex::new(gate_rx);
        listeners.add(Arc::new(move |_: &Config, _: &Config| {
            let _ = gate_rx.lock().recv();
        }));

        let (old, new) = configs();
        listeners.notify(old.clone(), new.clone());
        let c = calls.clone();
        listeners.add(Arc::new(move |_: &Config, _: &Config| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        gate_tx.send(()).unwrap();
        listeners.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        listeners.notify(new, old);
        gate_tx.send(()).unwrap();
        listeners.flush();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_id_display() {
        assert_eq!(ListenerId(7).to_string(), "listener-7");
    }
}
