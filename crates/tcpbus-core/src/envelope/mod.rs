//! Envelope module containing the message object and the `"data"` payload helpers.

pub mod message;
pub mod payload;

pub use message::{Message, MessagePriority, Value};
pub use payload::{data_message, take_data, EnvelopeError, DATA_FIELD};
