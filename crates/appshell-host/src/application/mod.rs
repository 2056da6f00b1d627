//! Application layer: the module bridge and the services built on it.

pub mod registry;
pub mod update_channel;
