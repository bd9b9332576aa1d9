//! The message object exchanged over uplink channels.
//!
//! A [`Message`] is a small JSON-like object: a map from field names to
//! [`Value`]s.  Unlike JSON it has a first-class [`Value::Blob`] variant, so raw
//! socket bytes can travel without being re-encoded.
//!
//! The bus decides how messages are moved around; this module only defines
//! their shape.  `Serialize` is derived so a message can be rendered for log
//! output with [`Message::to_json_string`].

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

// ── Priority ──────────────────────────────────────────────────────────────────

/// Delivery priority attached to every message on a channel.
///
/// The bridge itself does not reorder anything by priority; it sends with
/// [`MessagePriority::Routine`] and only logs the priority it receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum MessagePriority {
    /// Normal traffic.
    #[default]
    Routine,
    /// Expedited traffic.
    Priority,
}

impl fmt::Display for MessagePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessagePriority::Routine => f.write_str("ROUTINE"),
            MessagePriority::Priority => f.write_str("PRIORITY"),
        }
    }
}

// ── Values ────────────────────────────────────────────────────────────────────

/// A single field value inside a [`Message`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    String(String),
    /// Raw bytes.  Rendered as an array of numbers in JSON log output.
    Blob(Vec<u8>),
    Array(Vec<Value>),
    Object(Message),
}

impl Value {
    /// Short name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::String(_) => "string",
            Value::Blob(_) => "blob",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    /// Returns the bytes if this is a blob.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Message> for Value {
    fn from(v: Message) -> Self {
        Value::Object(v)
    }
}

// ── Message ───────────────────────────────────────────────────────────────────

/// An object of named fields.
///
/// Field order is stable (sorted by name) so log output is deterministic.
///
/// # Examples
///
/// ```rust
/// use tcpbus_core::{Message, Value};
///
/// let mut msg = Message::new();
/// msg.add("reason", "peer closed");
/// assert_eq!(msg.get("reason"), Some(&Value::String("peer closed".into())));
/// assert_eq!(msg.to_json_string(), r#"{"reason":"peer closed"}"#);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Message {
    fields: BTreeMap<String, Value>,
}

impl Message {
    /// Creates an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a field, returning the previous value if any.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.fields.insert(name.into(), value.into())
    }

    /// Builder-style variant of [`add`](Self::add).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.add(name, value);
        self
    }

    /// Borrows a field.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Removes a field and returns it by value.
    pub fn extract(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Renders the message as compact JSON for log output.
    ///
    /// Rendering cannot fail for this type (all keys are strings), but the
    /// fallback keeps log statements free of error handling.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_json_string())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
