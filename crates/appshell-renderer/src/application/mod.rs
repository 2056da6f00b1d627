//! Application layer: local event routing.

pub mod router;
