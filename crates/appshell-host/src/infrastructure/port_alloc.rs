//! Free-port discovery for the bundle server.
//!
//! The browser view remembers origins per port, so the server prefers a
//! stable, well-known candidate range over OS-assigned ephemeral ports.
//! Candidates are probed in ascending order by briefly binding them; the
//! result preserves that order. An empty result is not an error here; the
//! caller decides what "no ports" means.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;
use tracing::debug;

/// Inclusive candidate port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Creates a range after checking its bounds.
    ///
    /// # Errors
    ///
    /// [`PortAllocError::EmptyRange`] when `start > end`.
    pub fn new(start: u16, end: u16) -> Result<Self, PortAllocError> {
        if start > end {
            return Err(PortAllocError::EmptyRange { start, end });
        }
        Ok(Self { start, end })
    }

    fn candidates(self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

/// Errors from range construction.
#[derive(Debug, Error)]
pub enum PortAllocError {
    /// The configured range has no candidates.
    #[error("port range [{start}, {end}] is empty")]
    EmptyRange { start: u16, end: u16 },
}

/// Probes `range` on `host` and returns the free ports, in ascending order.
///
/// A port is "free" if it could be bound at probe time; the probe listener is
/// released immediately, so a returned port can still be lost to a race
/// before the caller binds it. The caller must treat its own bind failure as
/// a distinct error, not re-probe here.
pub async fn find_free_ports(host: &str, range: PortRange) -> Vec<u16> {
    let mut free = Vec::new();
    for port in range.candidates() {
        let addr: SocketAddr = match format!("{host}:{port}").parse() {
            Ok(a) => a,
            Err(e) => {
                debug!(%host, port, "unparseable candidate address: {e}");
                continue;
            }
        };
        match TcpListener::bind(addr).await {
            Ok(probe) => {
                drop(probe);
                free.push(port);
            }
            Err(e) => {
                debug!(port, "candidate port unavailable: {e}");
            }
        }
    }
    free
}

// ── Tests ─────────────────────────────────────────────────────────────────────
