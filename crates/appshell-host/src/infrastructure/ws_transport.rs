//! WebSocket transport: accept loop and per-renderer session management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured bridge address.
//! 2. Accepting incoming TCP connections from renderer processes.
//! 3. Upgrading each connection to a WebSocket session.
//! 4. Feeding every decoded inbound frame to the bridge, refreshing the
//!    bridge's renderer reference as it goes.
//! 5. Draining outbound frames from the session's channel into the socket.
//! 6. Gracefully shutting down when the `running` flag is cleared.
//!
//! Each renderer session runs in its own Tokio task; the accept loop never
//! blocks on a session. Only one renderer is expected at a time, but a second
//! connection (a reload, or a stray client) is not refused: whichever
//! connection sent the most recent frame holds the bridge's renderer
//! reference, so a reloaded renderer supersedes its predecessor without any
//! teardown protocol.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, info, warn};

use appshell_core::protocol::codec::{decode_event, encode_event};
use appshell_core::protocol::messages::{WireEvent, BOOTSTRAP_EVENT_NAME};

use crate::application::registry::{Bridge, RendererSink};

// ── Renderer sink ─────────────────────────────────────────────────────────────

/// Live outbound handle for one renderer session.
///
/// Forwarding is a channel send; the session's write task owns the socket.
/// The `destroyed` flag flips when either half of the session ends, after
/// which the bridge reports the reference as dead instead of queueing frames
/// nobody will drain.
struct WsRendererSink {
    outbound: mpsc::UnboundedSender<WireEvent>,
    destroyed: Arc<AtomicBool>,
}

impl RendererSink for WsRendererSink {
    fn forward(&self, frame: WireEvent) -> bool {
        self.outbound.send(frame).is_ok()
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Relaxed)
    }
}

// ── Listener ──────────────────────────────────────────────────────────────────

/// Bound bridge listener, ready to run its accept loop.
///
/// Binding and running are split so the caller can observe bind failures
/// (and the actual local address) before committing to the loop.
pub struct BridgeListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl BridgeListener {
    /// Binds the bridge TCP listener.
    ///
    /// # Errors
    ///
    /// Fails if the address cannot be bound (port in use, no permission).
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind bridge listener on {addr}"))?;
        let local_addr = listener
            .local_addr()
            .context("failed to read bridge listener address")?;
        info!("bridge listening on {local_addr}");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The bound address, with the OS-assigned port resolved.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop until `running` is cleared.
    ///
    /// Each accepted connection gets its own session task. A short timeout on
    /// `accept()` lets the loop poll the `running` flag even when no renderer
    /// is connecting.
    pub async fn run(self, bridge: Bridge, running: Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping bridge accept loop");
                break;
            }

            match timeout(Duration::from_millis(200), self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    info!("renderer connection from {peer_addr}");
                    let bridge = bridge.clone();
                    tokio::spawn(async move {
                        handle_renderer_session(stream, peer_addr, bridge).await;
                    });
                }
                Ok(Err(e)) => {
                    // Transient accept error; keep the bridge alive.
                    warn!("bridge accept error: {e}");
                }
                Err(_) => {
                    // Timeout, no connection attempt; re-check the flag.
                }
            }
        }
    }
}

// ── Per-session handler ───────────────────────────────────────────────────────

/// Entry point of each per-session task; wraps [`run_session`] to log the
/// outcome while `?` stays usable inside.
async fn handle_renderer_session(raw_stream: TcpStream, peer_addr: SocketAddr, bridge: Bridge) {
    match run_session(raw_stream, peer_addr, bridge).await {
        Ok(()) => info!("renderer session {peer_addr} closed normally"),
        Err(e) => warn!("renderer session {peer_addr} closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one renderer WebSocket session.
///
/// After the handshake, two tasks run concurrently:
///
/// - **Writer**: drains the session's outbound channel into the socket as
///   JSON text frames.
/// - **Reader**: decodes inbound text frames, refreshes the bridge's renderer
///   reference, and dispatches each frame (the bootstrap frame only refreshes
///   the reference).
///
/// The session ends when either task finishes; the sink is then marked
/// destroyed so the bridge stops routing sends at it.
async fn run_session(
    raw_stream: TcpStream,
    peer_addr: SocketAddr,
    bridge: Bridge,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(raw_stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    debug!("renderer WebSocket session established: {peer_addr}");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<WireEvent>();
    let destroyed = Arc::new(AtomicBool::new(false));
    let sink: Arc<dyn RendererSink> = Arc::new(WsRendererSink {
        outbound: outbound_tx,
        destroyed: Arc::clone(&destroyed),
    });

    // Writer: outbound channel → socket.
    let writer_destroyed = Arc::clone(&destroyed);
    let session_id_writer = peer_addr.to_string();
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let text = match encode_event(&frame) {
                Ok(t) => t,
                Err(e) => {
                    warn!("session {session_id_writer}: failed to encode frame: {e}");
                    continue;
                }
            };
            if ws_tx.send(WsMessage::Text(text)).await.is_err() {
                debug!("session {session_id_writer}: WebSocket send failed (renderer gone)");
                break;
            }
        }
        writer_destroyed.store(true, Ordering::Relaxed);
    });

    // Reader: socket → bridge.
    let session_id = peer_addr.to_string();
    let reader_destroyed = Arc::clone(&destroyed);
    let reader_task = tokio::spawn(async move {
        loop {
            let ws_msg = match ws_rx.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                    debug!("session {session_id}: renderer WebSocket closed normally");
                    break;
                }
                Some(Err(e)) => {
                    warn!("session {session_id}: renderer WebSocket error: {e}");
                    break;
                }
                None => {
                    debug!("session {session_id}: renderer stream ended");
                    break;
                }
            };

            match ws_msg {
                WsMessage::Text(text) => {
                    let frame = match decode_event(&text) {
                        Ok(f) => f,
                        Err(e) => {
                            // One malformed frame is not worth the session.
                            warn!("session {session_id}: invalid frame from renderer: {e}");
                            continue;
                        }
                    };

                    // Every inbound frame re-asserts this connection as "the"
                    // renderer; the bootstrap frame exists so this happens
                    // before any application event needs an outbound path.
                    bridge.capture_renderer(Arc::clone(&sink));

                    if frame.event == BOOTSTRAP_EVENT_NAME {
                        debug!("session {session_id}: renderer bootstrap received");
                        continue;
                    }
                    bridge.dispatch(frame);
                }
                WsMessage::Binary(_) => {
                    // The bridge protocol is JSON text frames only.
                    warn!("session {session_id}: unexpected binary frame (ignored)");
                }
                WsMessage::Ping(data) => {
                    debug!("session {session_id}: WebSocket ping ({} bytes)", data.len());
                }
                WsMessage::Pong(_) => {
                    debug!("session {session_id}: WebSocket pong received");
                }
                WsMessage::Close(_) => {
                    debug!("session {session_id}: WebSocket Close frame received");
                    break;
                }
                WsMessage::Frame(_) => {
                    debug!("session {session_id}: raw frame (ignored)");
                }
            }
        }
        reader_destroyed.store(true, Ordering::Relaxed);
    });

    tokio::select! {
        _ = writer_task => debug!("session {peer_addr}: writer task ended"),
        _ = reader_task => debug!("session {peer_addr}: reader task ended"),
    }
    destroyed.store(true, Ordering::Relaxed);

    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
