//! Error and ready notifications.
//!
//! Observers register callbacks and get back a [`ListenerId`] to unsubscribe
//! with. Callbacks run synchronously on the task that emits, outside the
//! registry lock, so a callback may subscribe or unsubscribe freely.

use crate::error::DbError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Handle returned by a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type ErrorListener = Arc<dyn Fn(&DbError) + Send + Sync>;
type ReadyListener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct EventHub {
    next_id: AtomicU64,
    error_listeners: Mutex<Vec<(ListenerId, ErrorListener)>>,
    ready_listeners: Mutex<Vec<(ListenerId, ReadyListener)>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a callback for connection-level errors.
    pub fn on_error<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&DbError) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.error_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    /// Register a callback for the end of a successful initialization.
    pub fn on_ready<F>(&self, listener: F) -> ListenerId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.ready_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(listener)));
        id
    }

    /// Remove a callback. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut removed = false;
        self.error_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(lid, _)| {
                let keep = *lid != id;
                removed |= !keep;
                keep
            });
        self.ready_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(lid, _)| {
                let keep = *lid != id;
                removed |= !keep;
                keep
            });
        removed
    }

    pub fn emit_error(&self, error: &DbError) {
        let listeners: Vec<ErrorListener> = self
            .error_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(error);
        }
    }

    pub fn emit_ready(&self) {
        let listeners: Vec<ReadyListener> = self
            .ready_listeners
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener();
        }
    }
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let errors = self.error_listeners.lock().map(|l| l.len()).unwrap_or(0);
        let ready = self.ready_listeners.lock().map(|l| l.len()).unwrap_or(0);
        f.debug_struct("EventHub")
            .field("error_listeners", &errors)
            .field("ready_listeners", &ready)
            .finish()
    }
}
