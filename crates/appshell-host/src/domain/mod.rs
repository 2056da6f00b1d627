//! Domain layer: pure configuration types, no I/O beyond config persistence.

pub mod config;
