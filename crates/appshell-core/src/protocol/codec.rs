//! JSON codec for bridge frames.
//!
//! Frames travel as WebSocket text frames, one JSON-encoded [`WireEvent`]
//! per frame. Decoding rejects frames with an empty event name so that the
//! dispatch layers never see an unroutable frame.

use thiserror::Error;

use super::messages::WireEvent;

/// Errors produced while encoding or decoding a bridge frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame could not be serialized to JSON.
    #[error("failed to encode bridge frame: {0}")]
    Encode(#[source] serde_json::Error),

    /// The text was not a valid JSON frame.
    #[error("failed to decode bridge frame: {0}")]
    Decode(#[source] serde_json::Error),

    /// The frame decoded but carried an empty event name.
    #[error("bridge frame has an empty event name")]
    EmptyEvent,
}

/// Encodes a frame to its wire text.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] when serialization fails (only possible for
/// non-string JSON map keys, which [`WireEvent`] cannot contain in practice).
pub fn encode_event(frame: &WireEvent) -> Result<String, CodecError> {
    serde_json::to_string(frame).map_err(CodecError::Encode)
}

/// Decodes a wire text into a frame.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed JSON and
/// [`CodecError::EmptyEvent`] when the event name is missing or empty.
pub fn decode_event(text: &str) -> Result<WireEvent, CodecError> {
    let frame: WireEvent = serde_json::from_str(text).map_err(CodecError::Decode)?;
    if frame.event.is_empty() {
        return Err(CodecError::EmptyEvent);
    }
    Ok(frame)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
