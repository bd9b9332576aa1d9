//! The session-owned end of an uplink channel.
//!
//! # State machine
//!
//! ```text
//! Connected ──open()──► Open
//!     │                  │
//!     └──begin_closing()─┴──► Closing ──close()──► Closed
//! ```
//!
//! - `Connected`: the remote proxy is attached; dispatch is accepted so a bus
//!   may deliver before the owner has called `open()`.
//! - `Open`: fully operational; the owner may `send()`.
//! - `Closing`: teardown has begun.  The handler slot is empty and every
//!   `dispatch_*` call is rejected.
//! - `Closed`: the remote side has been told; only `release()` remains.
//!
//! The state lives in an `AtomicU8` so the transition into `Closing` happens
//! exactly once no matter how many tasks race for it.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use super::{ChannelError, RemoteProxy, UplinkHandler};
use crate::envelope::{Message, MessagePriority};

/// Lifecycle state of a [`LocalEndpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EndpointState {
    Connected = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl EndpointState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => EndpointState::Connected,
            1 => EndpointState::Open,
            2 => EndpointState::Closing,
            _ => EndpointState::Closed,
        }
    }

    /// Whether the bus may still invoke handler callbacks.
    pub fn accepts_dispatch(self) -> bool {
        matches!(self, EndpointState::Connected | EndpointState::Open)
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EndpointState::Connected => "connected",
            EndpointState::Open => "open",
            EndpointState::Closing => "closing",
            EndpointState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// The local end of a channel, owned by exactly one session.
pub struct LocalEndpoint {
    id: String,
    state: AtomicU8,
    handler: RwLock<Option<Arc<dyn UplinkHandler>>>,
    remote: RwLock<Option<Arc<dyn RemoteProxy>>>,
}

impl LocalEndpoint {
    /// Creates an endpoint in the `Connected` state with empty slots.
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            state: AtomicU8::new(EndpointState::Connected as u8),
            handler: RwLock::new(None),
            remote: RwLock::new(None),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> EndpointState {
        EndpointState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Installs the callbacks the bus will reach through `dispatch_*`.
    pub fn set_handler(&self, handler: Arc<dyn UplinkHandler>) {
        *self.handler.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    /// Returns `true` while a handler is installed.
    pub fn has_handler(&self) -> bool {
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Attaches the remote proxy returned by [`ServerEndpoint::connect`].
    ///
    /// [`ServerEndpoint::connect`]: super::ServerEndpoint::connect
    pub fn set_remote(&self, remote: Arc<dyn RemoteProxy>) {
        *self.remote.write().unwrap_or_else(PoisonError::into_inner) = Some(remote);
    }

    fn remote(&self) -> Result<Arc<dyn RemoteProxy>, ChannelError> {
        self.remote
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ChannelError::NotConnected)
    }

    // ── Owner-facing operations ───────────────────────────────────────────────

    /// Opens the channel: `Connected → Open`.
    ///
    /// # Errors
    ///
    /// [`ChannelError::NotAccepting`] if the endpoint is not `Connected`,
    /// [`ChannelError::NotConnected`] without a remote, or whatever the remote
    /// proxy returns.
    pub async fn open(&self) -> Result<(), ChannelError> {
        let state = self.state();
        if state != EndpointState::Connected {
            return Err(ChannelError::NotAccepting(state));
        }
        self.remote()?.open().await?;
        self.state
            .compare_exchange(
                EndpointState::Connected as u8,
                EndpointState::Open as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(|_| ())
            .map_err(|current| ChannelError::NotAccepting(EndpointState::from_u8(current)))
    }

    /// Sends a message to the remote side.  Only valid while `Open`.
    pub fn send(&self, message: Message, priority: MessagePriority) -> Result<(), ChannelError> {
        let state = self.state();
        if state != EndpointState::Open {
            return Err(ChannelError::NotAccepting(state));
        }
        self.remote()?.deliver(message, priority)
    }

    /// Moves the endpoint into `Closing` and empties the handler slot.
    ///
    /// Returns `true` for the single caller that performed the transition and
    /// `false` for everyone else.
    pub fn begin_closing(&self) -> bool {
        let transitioned = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                EndpointState::from_u8(current)
                    .accepts_dispatch()
                    .then_some(EndpointState::Closing as u8)
            })
            .is_ok();
        if transitioned {
            self.handler
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            debug!("endpoint {}: closing", self.id);
        }
        transitioned
    }

    /// Tells the remote side the channel is closing and moves to `Closed`.
    ///
    /// Calling it again after the endpoint is `Closed` is a no-op.
    pub async fn close(&self, parameter: Message) -> Result<(), ChannelError> {
        let previous = self.state.swap(EndpointState::Closed as u8, Ordering::AcqRel);
        if EndpointState::from_u8(previous) == EndpointState::Closed {
            return Ok(());
        }
        self.handler
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.remote()?.close(parameter).await
    }

    /// Drops the remote proxy and any handler still installed.
    pub fn release(&self) {
        self.state
            .store(EndpointState::Closed as u8, Ordering::Release);
        self.handler
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.remote
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    // ── Bus-facing adapter ────────────────────────────────────────────────────

    /// Returns the handler if dispatch is currently allowed.
    ///
    /// The handler is cloned out of the slot so the lock is not held while
    /// the callback runs.
    fn dispatch_target(&self) -> Result<Arc<dyn UplinkHandler>, ChannelError> {
        let state = self.state();
        if !state.accepts_dispatch() {
            return Err(ChannelError::NotAccepting(state));
        }
        self.handler
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(ChannelError::NoHandler)
    }

    /// Delivers a message from the bus to the owner.
    pub async fn dispatch_receive(
        &self,
        message: Message,
        priority: MessagePriority,
    ) -> Result<(), ChannelError> {
        let handler = self.dispatch_target()?;
        handler.on_receive(message, priority).await;
        Ok(())
    }

    /// Notifies the owner that the remote side closed the channel.
    pub async fn dispatch_close(&self, parameter: Message) -> Result<(), ChannelError> {
        let handler = self.dispatch_target()?;
        handler.on_close(parameter).await;
        Ok(())
    }

    /// Forwards a control request to the owner and returns its reply.
    pub async fn dispatch_ctrl(&self, request: Message) -> Result<Message, ChannelError> {
        let handler = self.dispatch_target()?;
        Ok(handler.on_ctrl(request).await)
    }
}

impl fmt::Debug for LocalEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalEndpoint")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
