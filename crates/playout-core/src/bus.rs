//! Settings notification bus
//!
//! Listeners are told that "something changed" (tracks, quality, play state,
//! collection cursor) and re-read whatever they display from the session.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::error;

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, Listener)>>,
}

impl Registry {
    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(listener_id, _)| *listener_id != id);
    }
}

/// Fan-out registry of settings listeners
#[derive(Clone, Default)]
pub struct SettingsBus {
    registry: Arc<Registry>,
}

impl SettingsBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; the returned handle removes it
    pub fn register<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry.listeners.lock().push((id, Arc::new(listener)));

        ListenerHandle {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Invoke every listener in registration order
    ///
    /// A panicking listener is logged and skipped; the rest still run.
    pub fn notify(&self) {
        let listeners: Vec<Listener> = self
            .registry
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener())).is_err() {
                error!("Failed to call settings listener");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.registry.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration
    pub fn clear(&self) {
        self.registry.listeners.lock().clear();
    }
}

/// Subscription handle for one listener
///
/// Dropping the handle keeps the listener registered; call `dispose`.
#[derive(Debug, Clone)]
pub struct ListenerHandle {
    id: u64,
    registry: Weak<Registry>,
}

impl ListenerHandle {
    pub fn dispose(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}
