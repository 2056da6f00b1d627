//! Local bundle server: static serving with a rewrite/fallback chain and
//! hard-cutover restart.
//!
//! Every request goes through a four-stage resolution chain:
//!
//! 1. **Rewrite** – paths rooted at a bundle-internal prefix (`/app/`,
//!    `/assets/`) or naming a recognized static-asset extension pass through
//!    untouched; everything else (navigational routes like `/settings`) is
//!    remapped under the internal `/app/` prefix.
//! 2. **Current bundle** – static lookup in the current bundle directory.
//! 3. **Fallback bundle** – second-chance lookup in the previous full bundle,
//!    when one is configured. A differential bundle carries only changed
//!    files; the rest still resolves here.
//! 4. **Root document** – anything still unresolved yields the app's root
//!    document, so a navigational request never sees a bare 404.
//!
//! Restart is a hard cutover: the replacement instance binds first, then the
//! superseded instance's listener and every connection it still holds are
//! forcibly dropped. The new bundle must take effect immediately; in-flight
//! requests on the old instance are abandoned, not drained. Connections are
//! therefore served individually (rather than through an opaque serve-all
//! call) so each one's task handle stays abortable.
//!
//! Startup failures are reported through injected callbacks, never returned:
//! server bring-up is asynchronous relative to the caller, and the
//! orchestration layer owns any retry policy.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex as StdMutex;

use axum::extract::Request;
use axum::http::uri::{PathAndQuery, Uri};
use axum::{middleware, Router};
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use hyper_util::service::TowerToHyperService;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{debug, info, warn};

use super::port_alloc::{self, PortRange};

// ── Rewrite rule ──────────────────────────────────────────────────────────────

/// Path prefixes served directly from the bundle tree.
const PASSTHROUGH_PREFIXES: &[&str] = &["/app/", "/assets/"];

/// Extensions treated as static assets wherever they appear.
const STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "html", "json", "map", "wasm", "png", "jpg", "jpeg", "gif", "svg", "ico",
    "webp", "woff", "woff2", "ttf", "otf", "txt",
];

/// Relative location of the root document inside a bundle directory.
const ROOT_DOCUMENT: &str = "app/index.html";

/// Stage-1 rewrite. Returns the remapped path, or `None` to pass through.
fn rewrite_path(path: &str) -> Option<String> {
    if PASSTHROUGH_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
    {
        return None;
    }
    let last_segment = path.rsplit('/').next().unwrap_or(path);
    if let Some((_, ext)) = last_segment.rsplit_once('.') {
        if STATIC_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return None;
        }
    }
    Some(format!("/app{path}"))
}

/// `map_request` middleware applying [`rewrite_path`] to the request URI.
async fn rewrite_request(mut req: Request) -> Request {
    let Some(new_path) = rewrite_path(req.uri().path()) else {
        return req;
    };
    let path_and_query = match req.uri().query() {
        Some(query) => format!("{new_path}?{query}"),
        None => new_path,
    };
    let mut parts = req.uri().clone().into_parts();
    match PathAndQuery::try_from(path_and_query) {
        Ok(pq) => parts.path_and_query = Some(pq),
        Err(e) => {
            debug!("rewrite produced invalid path, leaving request as-is: {e}");
            return req;
        }
    }
    match Uri::from_parts(parts) {
        Ok(uri) => *req.uri_mut() = uri,
        Err(e) => debug!("rewrite produced invalid URI, leaving request as-is: {e}"),
    }
    req
}

/// Builds the stage 2–4 service chain for one (current, fallback) pair.
///
/// The pair is captured whole at build time; a restart builds a fresh router,
/// so an in-flight request can never observe a half-swapped pair.
fn build_router(current_dir: &Path, fallback_dir: Option<&Path>) -> Router {
    let root_document = ServeFile::new(current_dir.join(ROOT_DOCUMENT));
    let router = match fallback_dir {
        Some(fallback) => Router::new().fallback_service(
            ServeDir::new(current_dir)
                .fallback(ServeDir::new(fallback).fallback(root_document)),
        ),
        None => {
            Router::new().fallback_service(ServeDir::new(current_dir).fallback(root_document))
        }
    };
    router.layer(middleware::map_request(rewrite_request))
}

// ── Callbacks & errors ────────────────────────────────────────────────────────

/// Startup failures, reported through [`ServerCallbacks::on_startup_failure`].
#[derive(Debug, Error)]
pub enum StartupError {
    /// No candidate port in the configured range was free.
    #[error("no free port in [{start}, {end}]")]
    PortExhausted { start: u16, end: u16 },

    /// A probed-free port could not be bound after all (lost race with
    /// another process).
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },
}

/// Injected lifecycle callbacks.
///
/// `on_ready` fires after a fresh start, `on_restarted` after a cutover; both
/// carry the bound port so the caller can point the browser view at it.
pub struct ServerCallbacks {
    pub on_ready: Box<dyn Fn(u16) + Send + Sync>,
    pub on_restarted: Box<dyn Fn(u16) + Send + Sync>,
    pub on_startup_failure: Box<dyn Fn(StartupError) + Send + Sync>,
}

impl Default for ServerCallbacks {
    fn default() -> Self {
        Self {
            on_ready: Box::new(|port| info!(port, "bundle server ready")),
            on_restarted: Box::new(|port| info!(port, "bundle server restarted")),
            on_startup_failure: Box::new(|e| warn!("bundle server failed to start: {e}")),
        }
    }
}

/// Bundle server configuration: bind host and the candidate port range.
#[derive(Debug, Clone)]
pub struct BundleServerConfig {
    pub host: String,
    pub port_range: PortRange,
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    Listening,
    Restarting,
    Stopped,
}

// ── Server ────────────────────────────────────────────────────────────────────

/// One bound listener plus the connection tasks it has spawned.
struct ServerInstance {
    port: u16,
    accept_task: JoinHandle<()>,
    connections: std::sync::Arc<StdMutex<Vec<JoinHandle<()>>>>,
}

impl ServerInstance {
    /// Force-closes the instance: the listener goes away and every
    /// connection task is aborted mid-request.
    fn destroy(self) {
        self.accept_task.abort();
        let mut connections = self.connections.lock().expect("lock poisoned");
        let dropped = connections.len();
        for conn in connections.drain(..) {
            conn.abort();
        }
        info!(
            port = self.port,
            dropped, "superseded server instance destroyed"
        );
    }
}

/// The local bundle server.
///
/// State machine: uninitialized, listening, (restarting then listening)
/// repeated, stopped. `init` drives the first two; `init` with
/// `is_restart = true` drives the cutover; [`BundleServer::stop`] ends it.
pub struct BundleServer {
    config: BundleServerConfig,
    callbacks: ServerCallbacks,
    instance: Mutex<Option<ServerInstance>>,
    port: StdMutex<Option<u16>>,
    state: StdMutex<ServerState>,
}

impl BundleServer {
    pub fn new(config: BundleServerConfig, callbacks: ServerCallbacks) -> Self {
        Self {
            config,
            callbacks,
            instance: Mutex::new(None),
            port: StdMutex::new(None),
            state: StdMutex::new(ServerState::Uninitialized),
        }
    }

    /// The currently bound port, if the server is listening.
    pub fn port(&self) -> Option<u16> {
        *self.port.lock().expect("lock poisoned")
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.state.lock().expect("lock poisoned")
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock().expect("lock poisoned") = state;
    }

    /// Brings up a server instance for `current_dir` (with `fallback_dir` as
    /// the second-chance lookup).
    ///
    /// With `is_restart`, any previous instance is destroyed only after the
    /// replacement has bound, so a failed bind leaves the old instance
    /// serving rather than leaving nothing at all.
    ///
    /// Failures are reported through the injected callbacks; no retry is
    /// attempted here.
    pub async fn init(&self, current_dir: PathBuf, fallback_dir: Option<PathBuf>, is_restart: bool) {
        // A failed restart leaves the previous instance serving, so the state
        // falls back to whatever it was before the attempt.
        let state_before = self.state();
        if is_restart {
            self.set_state(ServerState::Restarting);
        }

        let free = port_alloc::find_free_ports(&self.config.host, self.config.port_range).await;
        let Some(&port) = free.first() else {
            self.set_state(state_before);
            (self.callbacks.on_startup_failure)(StartupError::PortExhausted {
                start: self.config.port_range.start,
                end: self.config.port_range.end,
            });
            return;
        };

        let listener = match TcpListener::bind((self.config.host.as_str(), port)).await {
            Ok(l) => l,
            Err(source) => {
                self.set_state(state_before);
                (self.callbacks.on_startup_failure)(StartupError::Bind { port, source });
                return;
            }
        };

        let router = build_router(&current_dir, fallback_dir.as_deref());
        info!(
            port,
            current = %current_dir.display(),
            fallback = ?fallback_dir,
            "bundle server listening"
        );

        let connections = std::sync::Arc::new(StdMutex::new(Vec::new()));
        let accept_connections = std::sync::Arc::clone(&connections);
        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, peer_addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("bundle server accept error: {e}");
                        continue;
                    }
                };
                debug!("bundle request connection from {peer_addr}");
                let service = TowerToHyperService::new(router.clone());
                let conn = tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        debug!("connection {peer_addr} ended: {e}");
                    }
                });
                let mut conns = accept_connections.lock().expect("lock poisoned");
                conns.retain(|handle: &JoinHandle<()>| !handle.is_finished());
                conns.push(conn);
            }
        });

        let new_instance = ServerInstance {
            port,
            accept_task,
            connections,
        };

        let previous = {
            let mut slot = self.instance.lock().await;
            slot.replace(new_instance)
        };
        if let Some(old) = previous {
            old.destroy();
        }
        *self.port.lock().expect("lock poisoned") = Some(port);
        self.set_state(ServerState::Listening);

        if is_restart {
            (self.callbacks.on_restarted)(port);
        } else {
            (self.callbacks.on_ready)(port);
        }
    }

    /// Stops the server, dropping the listener and every open connection.
    pub async fn stop(&self) {
        let previous = self.instance.lock().await.take();
        if let Some(instance) = previous {
            instance.destroy();
        }
        *self.port.lock().expect("lock poisoned") = None;
        self.set_state(ServerState::Stopped);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
