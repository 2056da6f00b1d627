//! AppShell host — entry point.
//!
//! This binary is the privileged side of the shell. It owns the module
//! bridge, the update signalling channel, and the local bundle server, and
//! runs until interrupted.
//!
//! # Usage
//!
//! ```text
//! appshell-host [OPTIONS]
//!
//! Options:
//!   --config <PATH>         Config file path [default: platform config dir]
//!   --bridge-bind <ADDR>    Bridge bind address [default: from config]
//!   --bridge-port <PORT>    Bridge WebSocket port [default: from config]
//!   --bundle-dir <PATH>     Bundle directory to serve [default: from config]
//!   --fallback-dir <PATH>   Previous full bundle for fallback lookup
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable               | Description                       |
//! |------------------------|-----------------------------------|
//! | `APPSHELL_CONFIG`      | Config file path                  |
//! | `APPSHELL_BRIDGE_BIND` | Bridge bind address               |
//! | `APPSHELL_BRIDGE_PORT` | Bridge WebSocket port             |
//! | `APPSHELL_BUNDLE_DIR`  | Bundle directory to serve         |
//! | `RUST_LOG`             | Log filter (overrides config)     |
//!
//! # Startup sequence
//!
//! 1. Load configuration, apply CLI/env overrides.
//! 2. Initialise `tracing` (RUST_LOG wins over the configured level).
//! 3. Construct the bridge and attach the update channel.
//! 4. Bring up the bundle server (failures surface via callbacks and abort
//!    startup rather than presenting a half-initialised shell).
//! 5. Run the bridge accept loop until Ctrl+C clears the shutdown flag.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use appshell_host::application::registry::Bridge;
use appshell_host::application::update_channel::UpdateChannel;
use appshell_host::domain::config::{self, AppConfig};
use appshell_host::infrastructure::bundle_server::{
    BundleServer, BundleServerConfig, ServerCallbacks,
};
use appshell_host::infrastructure::port_alloc::PortRange;
use appshell_host::infrastructure::ws_transport::BridgeListener;

/// Global broadcast announcing the bundle server's port after a fresh start.
const SERVER_READY_EVENT: &str = "serverReady";
/// Global broadcast announcing the new port after a hot-swap restart.
const SERVER_RESTARTED_EVENT: &str = "serverRestarted";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// AppShell host process.
///
/// Serves the application bundle over local HTTP and bridges events between
/// host modules and the renderer.
#[derive(Debug, Parser)]
#[command(
    name = "appshell-host",
    about = "Privileged host process: module bridge and local bundle server",
    version
)]
struct Cli {
    /// Config file path. Defaults to the platform config directory.
    #[arg(long, env = "APPSHELL_CONFIG")]
    config: Option<PathBuf>,

    /// Address to bind the bridge WebSocket listener to.
    ///
    /// The renderer is co-located, so the default config keeps this on
    /// loopback.
    #[arg(long, env = "APPSHELL_BRIDGE_BIND")]
    bridge_bind: Option<String>,

    /// Bridge WebSocket listener port.
    #[arg(long, env = "APPSHELL_BRIDGE_PORT")]
    bridge_port: Option<u16>,

    /// Bundle directory to serve. Defaults to the configured directory, or
    /// the working directory when nothing is configured.
    #[arg(long, env = "APPSHELL_BUNDLE_DIR")]
    bundle_dir: Option<PathBuf>,

    /// Previous full bundle directory, used as a second-chance lookup when
    /// the bundle directory is differential.
    #[arg(long)]
    fallback_dir: Option<PathBuf>,
}

impl Cli {
    /// Loads the config file and folds the CLI overrides into it.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly given config file cannot be read or
    /// parsed. A missing default config is not an error (defaults apply).
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => config::load_config().context("failed to load config")?,
        };
        if let Some(bind) = &self.bridge_bind {
            cfg.bridge.bind_address = bind.clone();
        }
        if let Some(port) = self.bridge_port {
            cfg.bridge.port = port;
        }
        if let Some(dir) = &self.bundle_dir {
            cfg.server.bundle_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.fallback_dir {
            cfg.server.fallback_dir = Some(dir.clone());
        }
        Ok(cfg)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = cli.load_config()?;

    // RUST_LOG takes precedence; the configured level is the fallback.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cfg.host.log_level.clone())),
        )
        .init();

    info!(version = %cfg.host.version, "AppShell host starting");

    // ── Bridge & update channel ───────────────────────────────────────────────
    let bridge = Bridge::new(Duration::from_millis(cfg.bridge.default_call_timeout_ms));

    let update_channel =
        UpdateChannel::attach(&bridge).context("failed to attach update channel")?;
    update_channel
        .on_check_for_updates(|| {
            // The actual check is the external updater's business; the host
            // only relays the request.
            info!("update check requested by renderer");
        })
        .context("failed to subscribe to update checks")?;

    // ── Bundle server ─────────────────────────────────────────────────────────
    let port_range = PortRange::new(cfg.server.port_range_start, cfg.server.port_range_end)
        .context("invalid bundle server port range")?;

    let startup_failed = Arc::new(AtomicBool::new(false));
    let callbacks = {
        let ready_bridge = bridge.clone();
        let restarted_bridge = bridge.clone();
        let failed = Arc::clone(&startup_failed);
        ServerCallbacks {
            on_ready: Box::new(move |port| {
                info!(port, "bundle server ready");
                broadcast_port(&ready_bridge, SERVER_READY_EVENT, port);
            }),
            on_restarted: Box::new(move |port| {
                info!(port, "bundle server restarted");
                broadcast_port(&restarted_bridge, SERVER_RESTARTED_EVENT, port);
            }),
            on_startup_failure: Box::new(move |e| {
                error!("bundle server startup failed: {e}");
                failed.store(true, Ordering::Relaxed);
            }),
        }
    };

    let server = BundleServer::new(
        BundleServerConfig {
            host: cfg.server.host.clone(),
            port_range,
        },
        callbacks,
    );

    let bundle_dir = match cfg.server.bundle_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("failed to resolve working directory")?,
    };
    server
        .init(bundle_dir, cfg.server.fallback_dir.clone(), false)
        .await;
    if startup_failed.load(Ordering::Relaxed) {
        // Better to exit than to present a shell with nothing behind it.
        anyhow::bail!("bundle server did not come up; aborting startup");
    }

    // ── Bridge listener & shutdown flag ───────────────────────────────────────
    let bridge_addr: SocketAddr =
        format!("{}:{}", cfg.bridge.bind_address, cfg.bridge.port)
            .parse()
            .with_context(|| {
                format!(
                    "invalid bridge bind address: '{}:{}'",
                    cfg.bridge.bind_address, cfg.bridge.port
                )
            })?;
    let listener = BridgeListener::bind(bridge_addr).await?;

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

    listener.run(bridge, running).await;

    server.stop().await;
    info!("AppShell host stopped");
    Ok(())
}

/// Best-effort port broadcast to the renderer.
///
/// The first bring-up usually happens before any renderer has connected;
/// the renderer then learns the port out-of-band (the browser view is
/// pointed at it), so a missing reference is expected there.
fn broadcast_port(bridge: &Bridge, event: &str, port: u16) {
    match bridge.send_global_event(event, vec![serde_json::json!(port)]) {
        Ok(()) => debug!(event, port, "port broadcast sent"),
        Err(e) => debug!(event, port, "port broadcast skipped: {e}"),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_leave_config_untouched() {
        let cli = Cli::parse_from(["appshell-host"]);
        assert!(cli.config.is_none());
        assert!(cli.bridge_bind.is_none());
        assert!(cli.bridge_port.is_none());
        assert!(cli.bundle_dir.is_none());
        assert!(cli.fallback_dir.is_none());
    }

    #[test]
    fn test_cli_bridge_port_override() {
        let cli = Cli::parse_from(["appshell-host", "--bridge-port", "9001"]);
        assert_eq!(cli.bridge_port, Some(9001));
    }

    #[test]
    fn test_cli_bundle_dir_override() {
        let cli = Cli::parse_from(["appshell-host", "--bundle-dir", "/tmp/bundle"]);
        assert_eq!(cli.bundle_dir, Some(PathBuf::from("/tmp/bundle")));
    }

    #[test]
    fn test_cli_overrides_fold_into_config() {
        // Arrange – no config file given, so defaults load, then overrides
        let cli = Cli::parse_from([
            "appshell-host",
            "--bridge-bind",
            "0.0.0.0",
            "--bridge-port",
            "9001",
            "--bundle-dir",
            "/tmp/bundle",
        ]);

        // Act
        let cfg = cli.load_config().expect("config");

        // Assert
        assert_eq!(cfg.bridge.bind_address, "0.0.0.0");
        assert_eq!(cfg.bridge.port, 9001);
        assert_eq!(cfg.server.bundle_dir, Some(PathBuf::from("/tmp/bundle")));
    }
}
