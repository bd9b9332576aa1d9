//! Shared fixtures for the integration tests.
//!
//! [`StubUplink`] stands in for an uplink service.  It records every byte a
//! session forwards, counts channel closes, and keeps each session's local
//! endpoint so a test can play the bus side (deliver a reply, close the
//! channel).

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tcpbus_core::{
    take_data, ChannelError, LocalEndpoint, MemoryBroker, Message, MessagePriority, RemoteProxy,
    ServerEndpoint,
};
use tcpbus_server::domain::InstanceDescriptor;
use tcpbus_server::infrastructure::{Listener, ListenerHandle};

// ── Traffic uplink ──────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct Traffic {
    connects: AtomicUsize,
    closes: AtomicUsize,
    refuse_remaining: AtomicUsize,
    panic_remaining: AtomicUsize,
    received: Mutex<Vec<u8>>,
    endpoints: Mutex<Vec<Arc<LocalEndpoint>>>,
}

impl Traffic {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Every byte forwarded by any session, in arrival order.
    pub fn received(&self) -> Vec<u8> {
        self.received.lock().unwrap().clone()
    }

    /// The local endpoint of the `index`-th accepted channel.
    pub fn endpoint(&self, index: usize) -> Arc<LocalEndpoint> {
        Arc::clone(&self.endpoints.lock().unwrap()[index])
    }
}

pub struct StubUplink {
    traffic: Arc<Traffic>,
}

impl StubUplink {
    /// Returns the shared traffic log and a service that refuses its first
    /// `refuse_first` connections.
    pub fn new(refuse_first: usize) -> (Arc<Traffic>, Arc<dyn ServerEndpoint>) {
        let traffic = Arc::new(Traffic::default());
        traffic.refuse_remaining.store(refuse_first, Ordering::SeqCst);
        let service = Arc::new(Self {
            traffic: Arc::clone(&traffic),
        });
        (traffic, service)
    }

    /// Like [`StubUplink::new`], but the first `panic_first` connections
    /// panic inside `connect` instead of returning an error.
    pub fn panicking(panic_first: usize) -> (Arc<Traffic>, Arc<dyn ServerEndpoint>) {
        let (traffic, service) = Self::new(0);
        traffic.panic_remaining.store(panic_first, Ordering::SeqCst);
        (traffic, service)
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

impl ServerEndpoint for StubUplink {
    fn connect(&self, local: Arc<LocalEndpoint>) -> Result<Arc<dyn RemoteProxy>, ChannelError> {
        if take_one(&self.traffic.panic_remaining) {
            panic!("stub uplink failed while connecting");
        }
        if take_one(&self.traffic.refuse_remaining) {
            return Err(ChannelError::Refused("stub refused".into()));
        }

        self.traffic.connects.fetch_add(1, Ordering::SeqCst);
        self.traffic.endpoints.lock().unwrap().push(local);
        Ok(Arc::new(StubProxy {
            traffic: Arc::clone(&self.traffic),
        }))
    }
}

struct StubProxy {
    traffic: Arc<Traffic>,
}

#[async_trait]
impl RemoteProxy for StubProxy {
    async fn open(&self) -> Result<(), ChannelError> {
        Ok(())
    }

    fn deliver(&self, message: Message, _priority: MessagePriority) -> Result<(), ChannelError> {
        let bytes = take_data(message).map_err(|e| ChannelError::Refused(e.to_string()))?;
        self.traffic.received.lock().unwrap().extend_from_slice(&bytes);
        Ok(())
    }

    async fn close(&self, _parameter: Message) -> Result<(), ChannelError> {
        self.traffic.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── Listener setup ────────────────────────────────────────────────────────────

pub fn loopback_instance(uplink: &str) -> InstanceDescriptor {
    InstanceDescriptor::new("it")
        .with_setting("ifc", "127.0.0.1")
        .with_setting("port", 0)
        .with_setting("backof", 16)
        .with_setting("bufsize", 1024)
        .with_client_endpoint("uplink", uplink)
}

/// Starts a loopback listener whose uplink is `service`.
pub async fn start_listener(
    service: Arc<dyn ServerEndpoint>,
) -> (Listener, ListenerHandle, SocketAddr) {
    let broker = Arc::new(MemoryBroker::new());
    broker.register("stub", service);
    let listener = Listener::configure(&loopback_instance("local:stub"), broker).unwrap();
    let mut handle = listener.start().unwrap();
    let addr = handle.local_addr().await.unwrap();
    (listener, handle, addr)
}

/// Polls `condition` every few milliseconds, panicking after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached within 2s");
}
