//! appshell-host library crate.
//!
//! The privileged host process of AppShell. It owns the module bridge (the
//! only mutable link between modules and the restricted renderer context),
//! serves the application bundle over local HTTP, and allocates the ports the
//! bundle server listens on.
//!
//! # Architecture
//!
//! ```text
//! Renderer (JSON over WebSocket)          Browser view (HTTP)
//!         ↕                                       ↕
//! [appshell-host]
//!   ├── domain/            Configuration schema (TOML)
//!   ├── application/
//!   │     ├── registry/        Module registry & bridge (on/send/call)
//!   │     └── update_channel/  Updater signal pass-through
//!   └── infrastructure/
//!         ├── ws_transport/    WebSocket listener, renderer sessions
//!         ├── bundle_server/   Static bundle serving with hot restart
//!         └── port_alloc/      Free-port scan over the candidate range
//! ```
//!
//! Layer rules: `domain` has no I/O; `application` depends on `domain` and
//! `appshell-core` only; `infrastructure` may use tokio, tungstenite, and the
//! HTTP stack.

pub mod application;
pub mod domain;
pub mod infrastructure;
