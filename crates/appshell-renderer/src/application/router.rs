//! Local event routing for the renderer-side bridge client.
//!
//! Supports multiple callbacks per namespaced event; subscription against
//! the transport is conceptually once per distinct namespaced name, with
//! fan-out handled locally in registration order. Since the WebSocket
//! delivers every frame anyway, "subscribe once" reduces to keeping one
//! callback list per name; [`EventRouter::on`] still reports whether a name
//! is new so callers mirroring the contract can act on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::debug;

use appshell_core::protocol::messages::WireEvent;
use appshell_core::protocol::naming::{self, NamingError};

/// Callback invoked with a dispatched event's arguments.
pub type EventCallback = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Routes inbound frames to locally registered callbacks.
#[derive(Default)]
pub struct EventRouter {
    callbacks: Mutex<HashMap<String, Vec<EventCallback>>>,
}

impl EventRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for the namespaced `(module, event)` name.
    ///
    /// Returns `true` when this is the first callback for that name.
    ///
    /// # Errors
    ///
    /// [`NamingError`] if either name fails validation.
    pub fn on<F>(&self, module: &str, event: &str, callback: F) -> Result<bool, NamingError>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let namespaced = naming::event_name(module, event)?;
        let mut callbacks = self.callbacks.lock().expect("lock poisoned");
        let list = callbacks.entry(namespaced).or_default();
        list.push(Arc::new(callback));
        Ok(list.len() == 1)
    }

    /// Fans one inbound frame out to its callbacks, in registration order.
    /// Returns the number of callbacks invoked.
    pub fn dispatch(&self, frame: &WireEvent) -> usize {
        let list = self
            .callbacks
            .lock()
            .expect("lock poisoned")
            .get(&frame.event)
            .cloned();
        match list {
            Some(list) => {
                for callback in &list {
                    callback(&frame.args);
                }
                list.len()
            }
            None => {
                debug!(event = %frame.event, "no callback for inbound event");
                0
            }
        }
    }

    /// Whether any callback is registered under `namespaced`.
    pub fn is_subscribed(&self, namespaced: &str) -> bool {
        self.callbacks
            .lock()
            .expect("lock poisoned")
            .contains_key(namespaced)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
