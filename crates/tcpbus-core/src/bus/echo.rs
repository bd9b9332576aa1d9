//! A service that sends every message straight back to its sender.
//!
//! Each channel gets its own pump task fed by a bounded queue, so echoed
//! messages come back in the order they were sent and `deliver` never blocks.
//! When the sender outruns the pump (its peer is not reading the echoes),
//! `deliver` fails with [`ChannelError::QueueFull`] instead of buffering.
//! The pump holds only a `Weak` reference to the local endpoint; it ends when
//! the endpoint releases its proxy (dropping the queue sender) or when the
//! endpoint stops accepting dispatch.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

use crate::channel::{ChannelError, LocalEndpoint, RemoteProxy, ServerEndpoint};
use crate::envelope::{Message, MessagePriority};

/// Messages queued per channel before `deliver` reports `QueueFull`.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Echo service.  Register it on a [`MemoryBroker`](super::MemoryBroker).
#[derive(Debug, Clone, Copy)]
pub struct EchoService {
    capacity: usize,
}

impl EchoService {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Echo service whose per-channel queue holds `capacity` messages
    /// (at least one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
        }
    }
}

impl Default for EchoService {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerEndpoint for EchoService {
    /// # Errors
    ///
    /// Returns [`ChannelError::Refused`] when called outside a Tokio runtime,
    /// because the per-channel pump task cannot be spawned.
    fn connect(&self, local: Arc<LocalEndpoint>) -> Result<Arc<dyn RemoteProxy>, ChannelError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| ChannelError::Refused("echo service needs a tokio runtime".into()))?;

        let (tx, rx) = mpsc::channel(self.capacity);
        let peer = local.id().to_string();
        runtime.spawn(pump(Arc::downgrade(&local), rx));

        debug!("echo: channel opened for {peer}");
        Ok(Arc::new(EchoProxy { tx, peer }))
    }
}

struct EchoProxy {
    tx: mpsc::Sender<(Message, MessagePriority)>,
    peer: String,
}

#[async_trait]
impl RemoteProxy for EchoProxy {
    async fn open(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn deliver(&self, message: Message, priority: MessagePriority) -> Result<(), ChannelError> {
        self.tx.try_send((message, priority)).map_err(|e| match e {
            TrySendError::Full(_) => ChannelError::QueueFull,
            TrySendError::Closed(_) => ChannelError::RemoteGone,
        })
    }

    async fn close(&self, parameter: Message) -> Result<(), ChannelError> {
        debug!("echo: {} closed the channel ({parameter})", self.peer);
        Ok(())
    }
}

async fn pump(
    local: Weak<LocalEndpoint>,
    mut rx: mpsc::Receiver<(Message, MessagePriority)>,
) {
    while let Some((message, priority)) = rx.recv().await {
        let Some(local) = local.upgrade() else {
            break;
        };
        if let Err(e) = local.dispatch_receive(message, priority).await {
            debug!("echo: stopping pump for {}: {e}", local.id());
            break;
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::channel::UplinkHandler;
    use crate::envelope::{data_message, take_data};

    struct Collect(mpsc::UnboundedSender<Vec<u8>>);

    #[async_trait]
    impl UplinkHandler for Collect {
        async fn on_close(&self, _parameter: Message) {}

        async fn on_receive(&self, message: Message, _priority: MessagePriority) {
            let _ = self.0.send(take_data(message).unwrap());
        }

        async fn on_ctrl(&self, _request: Message) -> Message {
            Message::new()
        }
    }

    #[test]
    fn test_connect_outside_runtime_is_refused() {
        let local = LocalEndpoint::new("no-runtime");
        let result = EchoService::new().connect(local);
        assert!(matches!(result, Err(ChannelError::Refused(_))));
    }

    #[tokio::test]
    async fn test_echo_returns_messages_in_order() {
        // Arrange
        let (tx, mut rx) = mpsc::unbounded_channel();
        let local = LocalEndpoint::new("echo-test");
        local.set_handler(Arc::new(Collect(tx)));
        let remote = EchoService::new().connect(Arc::clone(&local)).unwrap();
        local.set_remote(remote);
        local.open().await.unwrap();

        // Act
        for chunk in [&b"one"[..], b"two", b"three"] {
            local
                .send(data_message(chunk), MessagePriority::Routine)
                .unwrap();
        }

        // Assert
        let mut echoed = Vec::new();
        for _ in 0..3 {
            let bytes = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            echoed.push(bytes);
        }
        assert_eq!(
            echoed,
            vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
        );
    }

    #[tokio::test]
    async fn test_full_queue_rejects_delivery() {
        // Arrange: the pump cannot run until this test yields, so nothing drains
        let local = LocalEndpoint::new("echo-full");
        let remote = EchoService::with_capacity(2)
            .connect(Arc::clone(&local))
            .unwrap();
        local.set_remote(remote);
        local.open().await.unwrap();

        // Act
        let first = local.send(data_message(b"a"), MessagePriority::Routine);
        let second = local.send(data_message(b"b"), MessagePriority::Routine);
        let third = local.send(data_message(b"c"), MessagePriority::Routine);

        // Assert
        assert_eq!(first, Ok(()));
        assert_eq!(second, Ok(()));
        assert_eq!(third, Err(ChannelError::QueueFull));
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        assert_eq!(EchoService::with_capacity(0).capacity, 1);
        assert_eq!(EchoService::default().capacity, DEFAULT_QUEUE_CAPACITY);
    }

    #[tokio::test]
    async fn test_send_after_release_is_rejected() {
        // Arrange
        let local = LocalEndpoint::new("echo-release");
        let remote = EchoService::new().connect(Arc::clone(&local)).unwrap();
        local.set_remote(remote);
        local.open().await.unwrap();

        // Act
        local.release();
        let result = local.send(data_message(b"late"), MessagePriority::Routine);

        // Assert
        assert!(result.is_err());
    }
}
