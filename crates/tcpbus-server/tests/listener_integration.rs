//! Integration tests for listener configuration and the accept loop.
//!
//! These tests exercise [`Listener`] through its public API the same way
//! `main.rs` does: configure from a descriptor instance, start against a
//! broker, then talk to the bound socket.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use tcpbus_core::{EchoService, MemoryBroker};
use tcpbus_server::domain::ConfigError;
use tcpbus_server::infrastructure::{Listener, ListenerError};

use common::{loopback_instance, start_listener, wait_until, StubUplink};

fn echo_broker() -> Arc<MemoryBroker> {
    let broker = Arc::new(MemoryBroker::new());
    broker.register("echo", Arc::new(EchoService::new()));
    broker
}

// ── Configuration ─────────────────────────────────────────────────────────────

#[test]
fn test_missing_bufsize_fails_configuration() {
    // Arrange
    let mut descriptor = loopback_instance("local:echo");
    descriptor.settings.remove("bufsize");

    // Act
    let err = Listener::configure(&descriptor, echo_broker()).err().unwrap();

    // Assert
    assert!(matches!(
        err,
        ListenerError::Config(ConfigError::MissingParameter("bufsize"))
    ));
    assert_eq!(err.to_string(), "missing mandatory parameter bufsize");
}

#[test]
fn test_non_numeric_port_fails_configuration() {
    let descriptor = loopback_instance("local:echo").with_setting("port", "telnet");

    let err = Listener::configure(&descriptor, echo_broker()).err().unwrap();

    assert!(matches!(
        err,
        ListenerError::Config(ConfigError::InvalidParameter { name: "port", .. })
    ));
}

#[tokio::test]
async fn test_unknown_uplink_url_fails_start() {
    // Arrange
    let listener = Listener::configure(&loopback_instance("local:nowhere"), echo_broker()).unwrap();

    // Act
    let err = listener.start().err().unwrap();

    // Assert
    assert_eq!(err.to_string(), "not found: \"local:nowhere\"");
}

// ── Accept loop ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_echo_instance_round_trips_bytes() {
    // Arrange
    let listener = Listener::configure(&loopback_instance("local:echo"), echo_broker()).unwrap();
    let mut handle = listener.start().unwrap();
    let addr = handle.local_addr().await.unwrap();
    let mut client = TcpStream::connect(addr).await.unwrap();

    // Act + Assert: several exchanges over the same connection
    for line in [&b"hello\n"[..], b"tcp\n", b"bus\n"] {
        client.write_all(line).await.unwrap();
        let mut echoed = vec![0u8; line.len()];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut echoed))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, line);
    }
}

/// A session whose uplink refuses the connection is dropped; the listener
/// keeps accepting.
#[tokio::test]
async fn test_failed_session_setup_does_not_stop_accepting() {
    // Arrange
    let (traffic, service) = StubUplink::new(1);
    let (listener, handle, addr) = start_listener(service).await;

    // Act: first connection is refused by the uplink
    let mut rejected = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 1];
    let outcome = tokio::time::timeout(Duration::from_secs(2), rejected.read(&mut buf))
        .await
        .expect("refused connection was left open");

    // Assert
    assert!(matches!(outcome, Ok(0) | Err(_)));

    // Act: second connection works
    let mut accepted = TcpStream::connect(addr).await.unwrap();
    accepted.write_all(b"hi").await.unwrap();

    // Assert
    wait_until(|| traffic.received() == b"hi").await;
    assert_eq!(traffic.connects(), 1);
    assert_eq!(listener.registry().len(), 1);
    assert!(!handle.is_finished());
}

/// A session whose setup unwinds is released like a refused one, and the
/// listener keeps accepting.
#[tokio::test]
async fn test_panicking_session_setup_is_released() {
    // Arrange
    let (traffic, service) = StubUplink::panicking(1);
    let (listener, handle, addr) = start_listener(service).await;
    let registry = listener.registry();

    // Act: the uplink panics while connecting the first session
    let mut failed = TcpStream::connect(addr).await.unwrap();
    let mut buf = [0u8; 1];
    let outcome = tokio::time::timeout(Duration::from_secs(2), failed.read(&mut buf))
        .await
        .expect("connection of failed session was left open");

    // Assert
    assert!(matches!(outcome, Ok(0) | Err(_)));

    // Act: the next connection is served normally
    let mut accepted = TcpStream::connect(addr).await.unwrap();
    accepted.write_all(b"hi").await.unwrap();

    // Assert
    wait_until(|| traffic.received() == b"hi").await;
    assert_eq!(registry.len(), 1);
    assert!(!handle.is_finished());

    // Act
    drop(accepted);

    // Assert: no entry is left behind by the failed setup
    wait_until(|| registry.is_empty()).await;
}

/// Stopping the accept loop leaves established sessions running.
#[tokio::test]
async fn test_abort_keeps_existing_sessions() {
    // Arrange
    let listener = Listener::configure(&loopback_instance("local:echo"), echo_broker()).unwrap();
    let mut handle = listener.start().unwrap();
    let addr = handle.local_addr().await.unwrap();
    let mut client = TcpStream::connect(addr).await.unwrap();
    let registry = listener.registry();
    wait_until(|| registry.len() == 1).await;

    // Act
    handle.abort();
    client.write_all(b"still here").await.unwrap();

    // Assert
    let mut echoed = [0u8; 10];
    tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut echoed))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&echoed, b"still here");
}
