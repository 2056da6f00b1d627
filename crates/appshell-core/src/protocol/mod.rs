//! Bridge wire protocol: event naming, frame types, and the JSON codec.

pub mod codec;
pub mod messages;
pub mod naming;
