//! Codec for encoding and decoding Courier events.
//!
//! Events travel as JSON text frames over WebSocket; the transport already
//! delimits messages, so no length prefix is needed.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum encoded event size (64 KiB).
pub const MAX_EVENT_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Event exceeds maximum size.
    #[error("Event size {0} exceeds maximum {MAX_EVENT_SIZE}")]
    EventTooLarge(usize),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode an event to a JSON text frame.
///
/// # Errors
///
/// Returns an error if the event is too large or serialization fails.
pub fn encode<T: Serialize>(event: &T) -> Result<String, ProtocolError> {
    let text = serde_json::to_string(event).map_err(ProtocolError::Encode)?;

    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }

    Ok(text)
}

/// Decode an event from a JSON text frame.
///
/// # Errors
///
/// Returns an error if the text is too large or is not a valid event.
pub fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ProtocolError> {
    if text.len() > MAX_EVENT_SIZE {
        return Err(ProtocolError::EventTooLarge(text.len()));
    }

    serde_json::from_str(text).map_err(ProtocolError::Decode)
}
