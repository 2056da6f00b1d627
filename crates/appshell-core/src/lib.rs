//! # appshell-core
//!
//! Shared library for AppShell containing the bridge wire protocol: event-name
//! derivation, the JSON frame codec, and the constants both processes must
//! agree on.
//!
//! AppShell packages a built web application into a desktop shell. A
//! privileged **host** process serves the application bundle over local HTTP
//! and a restricted **renderer** context displays it. The two exchange
//! namespaced events over a loopback WebSocket; this crate defines everything
//! the two sides must compute identically and independently:
//!
//! - **`protocol::naming`** – pure derivation of namespaced event names and
//!   their response names, plus the validation that keeps the namespace
//!   collision-free.
//! - **`protocol::messages`** – the [`WireEvent`] frame envelope, the
//!   update-channel event constants, and the bootstrap event.
//! - **`protocol::codec`** – JSON text-frame encoding and decoding.
//!
//! This crate has zero dependencies on OS APIs, sockets, or async runtimes.

pub mod protocol;

// Re-export the most-used items at the crate root so callers can write
// `appshell_core::event_name` instead of the full module path.
pub use protocol::codec::{decode_event, encode_event, CodecError};
pub use protocol::messages::{VersionDescriptor, WireEvent, BOOTSTRAP_EVENT_NAME};
pub use protocol::naming::{
    event_name, response_event_name, validate_name, NamingError, RESPONSE_SUFFIX, SEPARATOR,
};
