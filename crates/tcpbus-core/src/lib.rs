//! # tcpbus-core
//!
//! Shared library for tcpbus containing the message envelope, the uplink
//! channel endpoint state machine, and a small in-process message bus.
//!
//! This crate has no dependency on sockets.  It is used by `tcpbus-server`,
//! which owns the TCP side of the bridge.
//!
//! # Architecture overview
//!
//! A tcpbus server relays raw TCP bytes onto a *message bus*.  Every accepted
//! connection gets its own bidirectional *channel* to a named service on the
//! bus (the "uplink").  This crate defines:
//!
//! - **`envelope`** – The [`Message`] object that travels over a channel, and
//!   the `"data"` blob convention used to carry raw socket bytes.
//!
//! - **`channel`** – The [`LocalEndpoint`] a session owns, the
//!   [`UplinkHandler`] callbacks the bus invokes on it, and the
//!   [`RemoteProxy`] / [`ServerEndpoint`] seams a bus implementation provides.
//!
//! - **`bus`** – The [`Broker`] registry seam, plus [`MemoryBroker`] and
//!   [`EchoService`] so a server can run without an external bus.

pub mod bus;
pub mod channel;
pub mod envelope;

// Re-export the most-used types at the crate root so callers can write
// `tcpbus_core::Message` instead of `tcpbus_core::envelope::message::Message`.
pub use bus::{Broker, EchoService, MemoryBroker};
pub use channel::{
    ChannelError, EndpointState, LocalEndpoint, RemoteProxy, ServerEndpoint, UplinkHandler,
};
pub use envelope::{data_message, take_data, EnvelopeError, Message, MessagePriority, Value};
