//! Module registry and host-side bridge.
//!
//! The bridge is the only channel between host modules and the restricted
//! renderer context. Each module registers once under a unique name and gets
//! an event namespace derived from it, so independently authored modules can
//! share the single transport without collisions.
//!
//! # Renderer reference
//!
//! The bridge owns exactly one piece of mutable shared state: a single-slot,
//! replace-only reference to "the" connected renderer. The transport layer
//! refreshes it on every inbound frame (the first of which is always the
//! bootstrap frame), which also covers reconnect-after-reload: a fresh
//! connection simply replaces the slot. The raw handle is never exposed;
//! every send goes through the not-yet-set / known-destroyed checks here.
//!
//! # Request/response correlation
//!
//! `call` derives the response event name from the request name, parks a
//! oneshot sender in the pending-call table under that derived name, and
//! races the receiver against a timeout. A oneshot settles at most once, so
//! a response arriving after the timeout is discarded structurally rather
//! than by bookkeeping. The timeout is the only cancellation path; there is
//! no explicit cancel API.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use appshell_core::protocol::messages::WireEvent;
use appshell_core::protocol::naming::{self, NamingError};

/// Handler invoked with the arguments of a dispatched event.
pub type EventHandler = Arc<dyn Fn(&[Value]) + Send + Sync>;

/// Outbound side of the renderer connection, as the bridge sees it.
///
/// The transport layer provides the live implementation; tests substitute a
/// mock to observe (or count) forwarded frames.
#[cfg_attr(test, mockall::automock)]
pub trait RendererSink: Send + Sync {
    /// Forwards one frame to the renderer. Returns `false` when the
    /// connection is gone and the frame was not delivered.
    fn forward(&self, frame: WireEvent) -> bool;

    /// Returns `true` once the underlying connection is known to be torn
    /// down.
    fn is_destroyed(&self) -> bool;
}

/// Errors returned synchronously by bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// `send` was attempted before any renderer reference was captured.
    #[error("no renderer reference captured yet; cannot send {event:?}")]
    NoRenderer { event: String },

    /// `send` was attempted after the captured reference was destroyed.
    #[error("renderer reference is destroyed; cannot send {event:?}")]
    DeadRenderer { event: String },

    /// A `call` went unanswered within its deadline.
    #[error("call {event:?} timed out after {timeout_ms} ms")]
    CallTimeout { event: String, timeout_ms: u64 },

    /// A `call` was issued while another call on the same event was still
    /// pending. The derived response name is the pending-call identity, so
    /// two in-flight calls on one event cannot be told apart.
    #[error("call {event:?} already has a pending response")]
    CallAlreadyPending { event: String },

    /// `register` was called twice with the same module name.
    #[error("module {0:?} is already registered")]
    ModuleAlreadyRegistered(String),

    /// A module or event name failed validation.
    #[error(transparent)]
    InvalidName(#[from] NamingError),
}

struct BridgeInner {
    /// Fallback `call` timeout for modules without an override.
    default_call_timeout: Duration,
    /// Names of registered modules; guards against namespace collisions.
    modules: Mutex<HashSet<String>>,
    /// Subscribers per namespaced event, in subscription order.
    handlers: Mutex<HashMap<String, Vec<EventHandler>>>,
    /// In-flight calls keyed by derived response event name.
    pending: Mutex<HashMap<String, oneshot::Sender<Vec<Value>>>>,
    /// The single replace-only renderer reference.
    renderer: Mutex<Option<Arc<dyn RendererSink>>>,
    /// Per-module `call` timeout overrides.
    call_timeouts: Mutex<HashMap<String, Duration>>,
}

/// The bridge context object.
///
/// Constructed once at process start and threaded explicitly through every
/// component that needs it; cloning is cheap (shared inner state).
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl Bridge {
    /// Creates a bridge with the given default `call` timeout.
    pub fn new(default_call_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                default_call_timeout,
                modules: Mutex::new(HashSet::new()),
                handlers: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                renderer: Mutex::new(None),
                call_timeouts: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Registers a module and returns its namespaced handle.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidName`] for names failing validation and
    /// [`BridgeError::ModuleAlreadyRegistered`] for duplicates.
    pub fn register(&self, name: &str) -> Result<Module, BridgeError> {
        naming::validate_name(name)?;
        let mut modules = self.inner.modules.lock().expect("lock poisoned");
        if !modules.insert(name.to_string()) {
            return Err(BridgeError::ModuleAlreadyRegistered(name.to_string()));
        }
        debug!(module = name, "module registered");
        Ok(Module {
            bridge: self.clone(),
            name: name.to_string(),
        })
    }

    /// Forwards a system-wide broadcast event, bypassing per-module
    /// namespacing.
    ///
    /// # Errors
    ///
    /// Same renderer-reference errors as [`Module::send`], plus
    /// [`BridgeError::InvalidName`] so global names stay disjoint from the
    /// namespaced space.
    pub fn send_global_event(&self, event: &str, args: Vec<Value>) -> Result<(), BridgeError> {
        naming::validate_name(event)?;
        self.forward_frame(event.to_string(), args)
    }

    /// Captures or refreshes the renderer reference.
    ///
    /// Called by the transport for every inbound frame. The slot is replaced,
    /// never mutated in place; a reconnect therefore supersedes a dead
    /// reference naturally.
    pub fn capture_renderer(&self, sink: Arc<dyn RendererSink>) {
        let mut slot = self.inner.renderer.lock().expect("lock poisoned");
        let is_current = slot.as_ref().is_some_and(|held| Arc::ptr_eq(held, &sink));
        if !is_current {
            *slot = Some(sink);
            debug!("renderer reference captured");
        }
    }

    /// Returns `true` once a renderer reference has been captured (it may
    /// still be dead).
    pub fn has_renderer(&self) -> bool {
        self.inner.renderer.lock().expect("lock poisoned").is_some()
    }

    /// Routes one inbound frame: settles a matching pending call, otherwise
    /// fans out to subscribers in subscription order.
    ///
    /// Handlers run to completion before the next frame is processed; they
    /// are invoked outside the subscription lock so they may re-enter the
    /// bridge.
    pub fn dispatch(&self, frame: WireEvent) {
        let WireEvent { event, args } = frame;

        let pending_tx = self
            .inner
            .pending
            .lock()
            .expect("lock poisoned")
            .remove(&event);
        if let Some(tx) = pending_tx {
            if tx.send(args).is_err() {
                // The caller already timed out; late responses are discarded.
                debug!(event = %event, "discarding response for settled call");
            }
            return;
        }

        let handlers = self
            .inner
            .handlers
            .lock()
            .expect("lock poisoned")
            .get(&event)
            .cloned();
        match handlers {
            Some(list) => {
                for handler in &list {
                    handler(&args);
                }
            }
            None => debug!(event = %event, "no subscriber for inbound event"),
        }
    }

    fn subscribe(&self, namespaced: String, handler: EventHandler) {
        self.inner
            .handlers
            .lock()
            .expect("lock poisoned")
            .entry(namespaced)
            .or_default()
            .push(handler);
    }

    fn forward_frame(&self, event: String, args: Vec<Value>) -> Result<(), BridgeError> {
        let sink = self
            .inner
            .renderer
            .lock()
            .expect("lock poisoned")
            .clone();
        let Some(sink) = sink else {
            return Err(BridgeError::NoRenderer { event });
        };
        if sink.is_destroyed() {
            return Err(BridgeError::DeadRenderer { event });
        }
        if !sink.forward(WireEvent::new(event.clone(), args)) {
            warn!(event = %event, "renderer sink rejected frame");
            return Err(BridgeError::DeadRenderer { event });
        }
        Ok(())
    }

    fn register_pending(
        &self,
        response_name: &str,
        request_name: &str,
    ) -> Result<oneshot::Receiver<Vec<Value>>, BridgeError> {
        let mut pending = self.inner.pending.lock().expect("lock poisoned");
        if pending.contains_key(response_name) {
            return Err(BridgeError::CallAlreadyPending {
                event: request_name.to_string(),
            });
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(response_name.to_string(), tx);
        Ok(rx)
    }

    fn remove_pending(&self, response_name: &str) {
        self.inner
            .pending
            .lock()
            .expect("lock poisoned")
            .remove(response_name);
    }

    fn call_timeout_for(&self, module: &str) -> Duration {
        self.inner
            .call_timeouts
            .lock()
            .expect("lock poisoned")
            .get(module)
            .copied()
            .unwrap_or(self.inner.default_call_timeout)
    }
}

/// Namespaced handle returned by [`Bridge::register`].
///
/// Lives for the process lifetime; there is no unregister.
#[derive(Clone)]
pub struct Module {
    bridge: Bridge,
    name: String,
}

impl Module {
    /// The module's name (and namespace prefix).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribes `handler` to the namespaced event. All handlers for one
    /// event fire in subscription order.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidName`] if the event name fails validation.
    pub fn on<F>(&self, event: &str, handler: F) -> Result<(), BridgeError>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        let namespaced = naming::event_name(&self.name, event)?;
        self.bridge.subscribe(namespaced, Arc::new(handler));
        Ok(())
    }

    /// Forwards one message to the renderer under the namespaced event name.
    ///
    /// # Errors
    ///
    /// [`BridgeError::NoRenderer`] before any bootstrap frame has been seen;
    /// [`BridgeError::DeadRenderer`] when the captured reference is torn
    /// down; [`BridgeError::InvalidName`] for invalid event names.
    pub fn send(&self, event: &str, args: Vec<Value>) -> Result<(), BridgeError> {
        let namespaced = naming::event_name(&self.name, event)?;
        self.bridge.forward_frame(namespaced, args)
    }

    /// Overrides the default `call` timeout for this module.
    pub fn set_default_fetch_timeout(&self, timeout: Duration) {
        self.bridge
            .inner
            .call_timeouts
            .lock()
            .expect("lock poisoned")
            .insert(self.name.clone(), timeout);
    }

    /// Issues a request and awaits the response, using the module's default
    /// timeout (see [`Module::set_default_fetch_timeout`]).
    ///
    /// # Errors
    ///
    /// See [`Module::call_with_timeout`].
    pub async fn call(&self, event: &str, args: Vec<Value>) -> Result<Vec<Value>, BridgeError> {
        let timeout = self.bridge.call_timeout_for(&self.name);
        self.call_with_timeout(event, timeout, args).await
    }

    /// Issues a request and awaits the response or the deadline, whichever
    /// comes first.
    ///
    /// The response event name is derived deterministically from the request
    /// name; the renderer answers by emitting that derived name, with no
    /// shared registry needed.
    ///
    /// # Errors
    ///
    /// [`BridgeError::CallTimeout`] (carrying the namespaced request name) on
    /// deadline; [`BridgeError::CallAlreadyPending`] when a call on the same
    /// event is still in flight; plus the send errors of [`Module::send`].
    pub async fn call_with_timeout(
        &self,
        event: &str,
        timeout: Duration,
        args: Vec<Value>,
    ) -> Result<Vec<Value>, BridgeError> {
        let request = naming::event_name(&self.name, event)?;
        let response = naming::response_event_name(&self.name, event)?;

        let rx = self.bridge.register_pending(&response, &request)?;
        if let Err(e) = self.bridge.forward_frame(request.clone(), args) {
            self.bridge.remove_pending(&response);
            return Err(e);
        }

        let timeout_ms = timeout.as_millis() as u64;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(values)) => Ok(values),
            // Sender dropped without an answer (bridge torn down mid-call);
            // indistinguishable from an unanswered request for the caller.
            Ok(Err(_)) => Err(BridgeError::CallTimeout {
                event: request,
                timeout_ms,
            }),
            Err(_elapsed) => {
                self.bridge.remove_pending(&response);
                Err(BridgeError::CallTimeout {
                    event: request,
                    timeout_ms,
                })
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
