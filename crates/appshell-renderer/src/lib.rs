//! appshell-renderer library crate.
//!
//! The restricted side of the AppShell bridge. User code running in the
//! renderer context talks to privileged host modules exclusively through
//! this client's `on`/`send` primitives; event names are derived with the
//! same scheme as on the host, so both sides compute identical namespaced
//! names independently, with no shared registry.
//!
//! On connect, the client emits the bootstrap frame before anything else,
//! guaranteeing the host a valid destination before any application event
//! could need one.

pub mod application;
pub mod infrastructure;
