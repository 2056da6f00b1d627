//! AppShell renderer client — entry point.
//!
//! A headless stand-in for the restricted UI context: it connects to the
//! host bridge, emits the bootstrap frame, subscribes to the update channel,
//! and logs what it receives. Real deployments embed the library crate in
//! the renderer runtime instead of running this binary.
//!
//! # Usage
//!
//! ```text
//! appshell-renderer [OPTIONS]
//!
//! Options:
//!   --host-addr <ADDR>          Host bridge address [default: 127.0.0.1:8033]
//!   --reconnect-interval <SECS> Reconnect interval [default: 5]
//! ```

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use appshell_core::protocol::messages::update_events;
use appshell_renderer::infrastructure::connection::{
    ConnectionEvent, RendererBridge, RendererConfig,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// AppShell renderer-side bridge client.
#[derive(Debug, Parser)]
#[command(
    name = "appshell-renderer",
    about = "Renderer-side bridge client for AppShell",
    version
)]
struct Cli {
    /// Address of the host's bridge WebSocket listener.
    #[arg(long, default_value = "127.0.0.1:8033", env = "APPSHELL_HOST_ADDR")]
    host_addr: SocketAddr,

    /// Reconnect interval in seconds.
    #[arg(long, default_value_t = 5, env = "APPSHELL_RECONNECT_INTERVAL")]
    reconnect_interval: u64,
}

impl Cli {
    fn into_renderer_config(self) -> RendererConfig {
        RendererConfig {
            host_addr: self.host_addr,
            reconnect_interval: Duration::from_secs(self.reconnect_interval),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.into_renderer_config();
    info!("AppShell renderer client starting, host = {}", config.host_addr);

    let bridge = Arc::new(RendererBridge::new(config));

    // Update-channel subscriptions: log the signals the host relays.
    bridge.on(update_events::MODULE, update_events::NEW_VERSION_READY, |args| {
        info!(?args, "new bundle version ready");
    })?;
    bridge.on(update_events::MODULE, update_events::UPDATE_ERROR, |args| {
        warn!(?args, "updater reported an error");
    })?;
    bridge.on(
        update_events::MODULE,
        update_events::VERSIONS_CLEANED_UP,
        |_| info!("superseded bundle versions cleaned up"),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let running_signal = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_signal.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let mut events = Arc::clone(&bridge).start(Arc::clone(&running)).await;
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Connected => {
                info!("bridge connection established");
                // Ask the host for an update check on every (re)connect.
                if let Err(e) =
                    bridge.send(update_events::MODULE, update_events::CHECK_FOR_UPDATES, vec![])
                {
                    warn!("could not request update check: {e}");
                }
            }
            ConnectionEvent::Disconnected => info!("bridge connection lost"),
        }
        if !running.load(Ordering::Relaxed) {
            break;
        }
    }

    info!("AppShell renderer client stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_target_bridge_port() {
        let cli = Cli::parse_from(["appshell-renderer"]);
        assert_eq!(cli.host_addr.port(), 8033);
        assert_eq!(cli.reconnect_interval, 5);
    }

    #[test]
    fn test_cli_host_addr_override() {
        let cli = Cli::parse_from(["appshell-renderer", "--host-addr", "127.0.0.1:9100"]);
        assert_eq!(cli.host_addr.port(), 9100);
    }

    #[test]
    fn test_into_renderer_config_converts_interval_to_duration() {
        let cli = Cli::parse_from(["appshell-renderer", "--reconnect-interval", "2"]);
        let config = cli.into_renderer_config();
        assert_eq!(config.reconnect_interval, Duration::from_secs(2));
    }
}
