//! The `"data"` payload convention.
//!
//! Socket bytes travel over a channel as a [`Message`] with one field,
//! `"data"`, holding a [`Value::Blob`].  One message carries exactly the bytes
//! of one socket `read()`; there is no framing, length prefix or
//! multiplexing on top of this.

use thiserror::Error;

use super::message::{Message, Value};

/// Name of the field that carries raw connection bytes.
pub const DATA_FIELD: &str = "data";

/// Reasons an inbound message cannot be turned into socket bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// The message has no `"data"` field at all.
    #[error("message has no \"data\" field")]
    MissingData,

    /// The `"data"` field is present but holds something other than a blob.
    #[error("\"data\" field is a {found}, expected a blob")]
    NotBlob { found: &'static str },
}

/// Wraps `bytes` as a `{"data": <blob>}` message.
///
/// # Examples
///
/// ```rust
/// use tcpbus_core::{data_message, take_data};
///
/// let msg = data_message(b"PING");
/// assert_eq!(take_data(msg).unwrap(), b"PING".to_vec());
/// ```
pub fn data_message(bytes: &[u8]) -> Message {
    Message::new().with(DATA_FIELD, Value::Blob(bytes.to_vec()))
}

/// Consumes `message` and returns the bytes of its `"data"` blob.
///
/// # Errors
///
/// - [`EnvelopeError::MissingData`] if the field is absent.
/// - [`EnvelopeError::NotBlob`] if the field holds another kind of value.
pub fn take_data(mut message: Message) -> Result<Vec<u8>, EnvelopeError> {
    match message.extract(DATA_FIELD) {
        Some(Value::Blob(bytes)) => Ok(bytes),
        Some(other) => Err(EnvelopeError::NotBlob {
            found: other.kind(),
        }),
        None => Err(EnvelopeError::MissingData),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
