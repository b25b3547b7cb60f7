//! Connection-scoped publish/subscribe table.
//!
//! Every socket client owns one [`EventBus`]. Inbound frames are emitted under a
//! key (a request id for the WebSocket API, an event name for data streams) and
//! every handler registered under that key runs, in registration order, on the
//! connection's driver task.

use crate::core::errors::ExchangeError;
use serde_json::Value;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, trace};

/// Handler invoked with each payload emitted under its key
pub type EventHandler = Arc<dyn Fn(&Value) + Send + Sync>;

/// Opaque handle returned by [`EventBus::on`], used to deregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct EventBus {
    handlers: Mutex<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self
            .handlers
            .lock()
            .map(|h| h.len())
            .unwrap_or_default();
        f.debug_struct("EventBus").field("keys", &keys).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under `key`.
    pub fn on<F>(&self, key: impl Into<String>, handler: F) -> SubscriptionId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.into())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns whether it was registered.
    pub fn off(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let mut removed = false;
        handlers.retain(|_, list| {
            let before = list.len();
            list.retain(|(handler_id, _)| *handler_id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    /// Invoke every handler registered under `key`.
    ///
    /// A panicking handler is logged and skipped; the rest still run. Emitting on
    /// a key with no handlers does nothing. Returns how many handlers ran to
    /// completion.
    pub fn emit(&self, key: &str, payload: &Value) -> usize {
        // Snapshot so handlers may register or deregister while we dispatch.
        let snapshot: Vec<EventHandler> = {
            let handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
            match handlers.get(key) {
                Some(list) => list.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return 0,
            }
        };

        trace!(key, handlers = snapshot.len(), "emit");
        let mut delivered = 0;
        for handler in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(key, %reason, "event handler panicked");
                }
            }
        }
        delivered
    }

    /// Number of handlers registered under `key`
    pub fn listener_count(&self, key: &str) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, Vec::len)
    }

    /// Stream every payload emitted under `key` into a channel.
    ///
    /// The handler stays registered until [`EventBus::off`] is called with the
    /// returned id; payloads emitted after the receiver is dropped are discarded.
    pub fn subscribe(
        &self,
        key: impl Into<String>,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<Value>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.on(key, move |payload| {
            let _ = tx.send(payload.clone());
        });
        (id, rx)
    }

    /// Register a one-shot waiter for the next payload under `key`.
    ///
    /// Registration happens immediately, so a frame that arrives between this call
    /// and awaiting the returned future is not missed.
    pub fn once(
        self: &Arc<Self>,
        key: impl Into<String>,
    ) -> impl std::future::Future<Output = Option<Value>> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let id = self.on(key, move |payload| {
            if let Some(tx) = slot.lock().unwrap_or_else(PoisonError::into_inner).take() {
                let _ = tx.send(payload.clone());
            }
        });
        let guard = Deregister {
            bus: Arc::clone(self),
            id,
        };
        async move {
            let _guard = guard;
            rx.await.ok()
        }
    }

    /// Wait up to `timeout` for the next payload under `key`.
    pub async fn next(
        self: &Arc<Self>,
        key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Value, ExchangeError> {
        let key = key.into();
        let waiter = self.once(key.clone());
        tokio::time::timeout(timeout, waiter)
            .await
            .map_err(|_| ExchangeError::ConnectionTimeout(format!("no event for '{}'", key)))?
            .ok_or_else(|| ExchangeError::Other(format!("waiter for '{}' dropped", key)))
    }
}

/// Removes a handler when dropped, whether or not its future completed
struct Deregister {
    bus: Arc<EventBus>,
    id: SubscriptionId,
}

impl Drop for Deregister {
    fn drop(&mut self) {
        self.bus.off(self.id);
    }
}
