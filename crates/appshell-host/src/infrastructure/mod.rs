//! Infrastructure layer: sockets, HTTP serving, and port discovery.

pub mod bundle_server;
pub mod port_alloc;
pub mod ws_transport;
