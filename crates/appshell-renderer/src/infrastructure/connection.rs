//! WebSocket connection from the renderer to the host bridge.
//!
//! Architecture:
//! - `RendererBridge` owns the outbound sender slot and the local
//!   [`EventRouter`].
//! - A reconnect loop keeps one connection alive; connection-state changes
//!   are surfaced to the caller on an `mpsc` channel.
//! - The bootstrap frame is written straight to the socket before the write
//!   task starts, so it is guaranteed to be the first frame of every
//!   connection, once per connect.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex as StdMutex,
};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use tracing::{debug, info, warn};

use appshell_core::protocol::codec::{decode_event, encode_event};
use appshell_core::protocol::messages::WireEvent;
use appshell_core::protocol::naming::{self, NamingError};

use crate::application::router::EventRouter;

/// Errors returned synchronously by the renderer-side client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A send was attempted while no connection to the host is up.
    #[error("not connected to host; cannot send {event:?}")]
    NotConnected { event: String },

    /// A module or event name failed validation.
    #[error(transparent)]
    InvalidName(#[from] NamingError),
}

/// Configuration for the renderer's bridge connection.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Address of the host's bridge WebSocket listener.
    pub host_addr: SocketAddr,
    /// Reconnect interval when the connection drops.
    pub reconnect_interval: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            host_addr: "127.0.0.1:8033".parse().expect("valid literal address"),
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

/// Connection-state changes surfaced to the caller.
#[derive(Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected,
    Disconnected,
}

/// The renderer-side bridge client.
pub struct RendererBridge {
    config: RendererConfig,
    router: Arc<EventRouter>,
    outbound: StdMutex<Option<mpsc::UnboundedSender<WireEvent>>>,
}

impl RendererBridge {
    /// Creates a new (not yet connected) client.
    pub fn new(config: RendererConfig) -> Self {
        Self {
            config,
            router: Arc::new(EventRouter::new()),
            outbound: StdMutex::new(None),
        }
    }

    /// Subscribes `callback` to a namespaced host event. Returns `true` for
    /// the first callback on that name (see [`EventRouter::on`]).
    ///
    /// # Errors
    ///
    /// [`ClientError::InvalidName`] for invalid names.
    pub fn on<F>(&self, module: &str, event: &str, callback: F) -> Result<bool, ClientError>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        Ok(self.router.on(module, event, callback)?)
    }

    /// Sends one namespaced event to the host.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotConnected`] while the connection is down,
    /// [`ClientError::InvalidName`] for invalid names.
    pub fn send(&self, module: &str, event: &str, args: Vec<Value>) -> Result<(), ClientError> {
        let namespaced = naming::event_name(module, event)?;
        self.send_frame(WireEvent::new(namespaced, args))
    }

    /// Answers a host-issued `call`: sends under the derived response name
    /// for `(module, event)`, which the host computed identically.
    ///
    /// # Errors
    ///
    /// Same as [`RendererBridge::send`].
    pub fn respond(&self, module: &str, event: &str, args: Vec<Value>) -> Result<(), ClientError> {
        let response = naming::response_event_name(module, event)?;
        self.send_frame(WireEvent::new(response, args))
    }

    fn send_frame(&self, frame: WireEvent) -> Result<(), ClientError> {
        let slot = self.outbound.lock().expect("lock poisoned");
        let Some(tx) = slot.as_ref() else {
            return Err(ClientError::NotConnected { event: frame.event });
        };
        let event = frame.event.clone();
        tx.send(frame)
            .map_err(|_| ClientError::NotConnected { event })
    }

    /// Connects to the host and keeps the connection alive.
    ///
    /// Returns a channel receiver delivering [`ConnectionEvent`]s. Runs a
    /// continuous reconnect loop until `running` is cleared.
    pub async fn start(self: Arc<Self>, running: Arc<AtomicBool>) -> mpsc::Receiver<ConnectionEvent> {
        let (tx, rx) = mpsc::channel(16);
        let this = Arc::clone(&self);
        let url = format!("ws://{}", self.config.host_addr);

        tokio::spawn(async move {
            while running.load(Ordering::Relaxed) {
                match connect_async(url.as_str()).await {
                    Ok((ws_stream, _resp)) => {
                        info!("connected to host bridge at {url}");
                        let _ = tx.send(ConnectionEvent::Connected).await;

                        this.run_connection(ws_stream).await;

                        *this.outbound.lock().expect("lock poisoned") = None;
                        let _ = tx.send(ConnectionEvent::Disconnected).await;
                        info!(
                            "disconnected from host; reconnecting in {:?}",
                            this.config.reconnect_interval
                        );
                    }
                    Err(e) => {
                        warn!("could not connect to host bridge at {url}: {e}");
                    }
                }

                if running.load(Ordering::Relaxed) {
                    tokio::time::sleep(this.config.reconnect_interval).await;
                }
            }
        });

        rx
    }

    /// Drives one established connection to completion.
    async fn run_connection(
        &self,
        ws_stream: tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    ) {
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        // Bootstrap before anything else may be written: the write task is
        // only spawned (and the outbound slot only filled) afterwards.
        let bootstrap = match encode_event(&WireEvent::bootstrap()) {
            Ok(text) => text,
            Err(e) => {
                warn!("failed to encode bootstrap frame: {e}");
                return;
            }
        };
        if let Err(e) = ws_tx.send(WsMessage::Text(bootstrap)).await {
            warn!("failed to send bootstrap frame: {e}");
            return;
        }
        debug!("bootstrap frame sent");

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WireEvent>();
        *self.outbound.lock().expect("lock poisoned") = Some(outbound_tx);

        let write_task = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let text = match encode_event(&frame) {
                    Ok(t) => t,
                    Err(e) => {
                        warn!("failed to encode outbound frame: {e}");
                        continue;
                    }
                };
                if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                    debug!("WebSocket send failed (host gone)");
                    break;
                }
            }
        });

        // Read loop: every inbound text frame is routed locally.
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => match decode_event(&text) {
                    Ok(frame) => {
                        let fired = self.router.dispatch(&frame);
                        debug!(event = %frame.event, fired, "inbound event routed");
                    }
                    Err(e) => warn!("invalid frame from host: {e}"),
                },
                Ok(WsMessage::Close(_)) => {
                    debug!("host closed the connection");
                    break;
                }
                Ok(_) => {
                    // Pings and pongs are handled by the library.
                }
                Err(e) => {
                    warn!("WebSocket read error: {e}");
                    break;
                }
            }
        }

        // Closing the outbound slot drops the sender and ends the write task.
        *self.outbound.lock().expect("lock poisoned") = None;
        write_task.abort();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config_targets_bridge_port() {
        let cfg = RendererConfig::default();
        assert_eq!(cfg.host_addr.port(), 8033);
        assert_eq!(cfg.reconnect_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_send_while_disconnected_fails_with_namespaced_event() {
        // Arrange – never connected
        let bridge = RendererBridge::new(RendererConfig::default());

        // Act
        let result = bridge.send("updater", "check", vec![json!(1)]);

        // Assert
        assert!(matches!(
            result,
            Err(ClientError::NotConnected { event }) if event == "updater__check"
        ));
    }

    #[test]
    fn test_send_rejects_invalid_names_before_connectivity_check() {
        let bridge = RendererBridge::new(RendererConfig::default());
        let result = bridge.send("bad__module", "check", vec![]);
        assert!(matches!(result, Err(ClientError::InvalidName(_))));
    }

    #[test]
    fn test_respond_derives_response_event_name() {
        // Arrange – a queued outbound slot we can observe directly
        let bridge = RendererBridge::new(RendererConfig::default());
        let (tx, mut rx) = mpsc::unbounded_channel();
        *bridge.outbound.lock().unwrap() = Some(tx);

        // Act
        bridge
            .respond("svc", "fetchState", vec![json!({"ok": true})])
            .expect("respond");

        // Assert
        let frame = rx.try_recv().expect("queued frame");
        assert_eq!(frame.event, "svc__fetchState__response");
        assert_eq!(frame.args, vec![json!({"ok": true})]);
    }

    #[test]
    fn test_subscriptions_reach_the_local_router() {
        let bridge = RendererBridge::new(RendererConfig::default());
        bridge.on("appUpdater", "error", |_| {}).expect("subscribe");
        assert!(bridge.router.is_subscribed("appUpdater__error"));
    }

    #[tokio::test]
    async fn test_start_returns_receiver_immediately() {
        // Arrange – an address that refuses connections, loop disabled
        let bridge = Arc::new(RendererBridge::new(RendererConfig {
            host_addr: "127.0.0.1:1".parse().unwrap(),
            reconnect_interval: Duration::from_secs(60),
        }));
        let running = Arc::new(AtomicBool::new(false));

        // Act – start returns synchronously even when connecting fails
        let rx = bridge.start(running).await;

        // Assert
        drop(rx);
    }
}
