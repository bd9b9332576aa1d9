//! Uplink channels: the seams between a session and the message bus.
//!
//! A channel has two ends.  The *local* end is a [`LocalEndpoint`] owned by
//! one session.  The *remote* end is whatever the bus hands back from
//! [`ServerEndpoint::connect`], seen by the session only as a
//! [`RemoteProxy`].
//!
//! ```text
//! Session ──send──► LocalEndpoint ──deliver──► RemoteProxy ──► bus service
//! Session ◄─on_receive── LocalEndpoint ◄─dispatch_receive── bus service
//! ```
//!
//! Traffic from the bus into the session always goes through the endpoint's
//! `dispatch_*` methods, which consult the endpoint state first.  Once the
//! session starts tearing down, the endpoint refuses dispatch on its own; the
//! bus does not need to know anything about session lifecycle.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::envelope::{Message, MessagePriority};

pub mod endpoint;

pub use endpoint::{EndpointState, LocalEndpoint};

/// Errors raised by channel operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The endpoint has no remote proxy (never connected, or released).
    #[error("endpoint is not connected")]
    NotConnected,

    /// The endpoint is in a state that does not allow the operation.
    #[error("endpoint is {0}")]
    NotAccepting(EndpointState),

    /// The endpoint accepts dispatch but nobody registered a handler.
    #[error("endpoint has no handler registered")]
    NoHandler,

    /// The remote side of the channel has gone away.
    #[error("remote endpoint is gone")]
    RemoteGone,

    /// The remote side is not keeping up; the message was not queued.
    #[error("remote queue is full")]
    QueueFull,

    /// A server endpoint refused to create a channel.
    #[error("connection refused: {0}")]
    Refused(String),
}

/// Callbacks a bus invokes on the owner of a [`LocalEndpoint`].
///
/// All three may be called concurrently with each other and with whatever
/// the owner is doing on its own task.
#[async_trait]
pub trait UplinkHandler: Send + Sync {
    /// The remote side closed the channel.
    async fn on_close(&self, parameter: Message);

    /// A message arrived from the remote side.
    async fn on_receive(&self, message: Message, priority: MessagePriority);

    /// A control-plane request arrived; the return value is the reply.
    async fn on_ctrl(&self, request: Message) -> Message;
}

/// The remote end of a channel, as seen from the local endpoint.
#[async_trait]
pub trait RemoteProxy: Send + Sync {
    /// Announces that the local side is ready to exchange messages.
    async fn open(&self) -> Result<(), ChannelError>;

    /// Queues a message for the remote side.  Fire-and-forget: returning
    /// `Ok` means the message was accepted, not that it was processed.
    fn deliver(&self, message: Message, priority: MessagePriority) -> Result<(), ChannelError>;

    /// Tells the remote side the local side is closing.
    async fn close(&self, parameter: Message) -> Result<(), ChannelError>;
}

/// A named service on the bus that sessions can open channels to.
pub trait ServerEndpoint: Send + Sync {
    /// Creates a channel to `local` and returns the proxy for its remote end.
    ///
    /// The implementation keeps `local` (typically as a `Weak`) so it can
    /// dispatch messages and close notifications back into it.
    fn connect(&self, local: Arc<LocalEndpoint>) -> Result<Arc<dyn RemoteProxy>, ChannelError>;
}
