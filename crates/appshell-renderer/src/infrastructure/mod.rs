//! Infrastructure layer: the WebSocket connection to the host.

pub mod connection;
