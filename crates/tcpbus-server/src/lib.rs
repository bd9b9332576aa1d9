//! tcpbus-server library crate.
//!
//! This crate bridges raw TCP connections onto message-bus channels.  Every
//! accepted connection becomes a *session* whose bytes travel to a named
//! uplink service as `{"data": <blob>}` messages, and whose uplink messages are
//! written back to the socket.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! TCP peer (raw bytes)
//!         ↕
//! [tcpbus-server]
//!   ├── domain/           Pure types: ListenerConfig, descriptors, session ids/states
//!   ├── application/      SessionRegistry: the arena that owns session records
//!   └── infrastructure/
//!         ├── listener/   Bind + accept loop, one task per listener
//!         ├── session/    Per-connection relay and idempotent teardown
//!         └── descriptor_file/ TOML descriptor loading
//!         ↕
//! uplink service (tcpbus-core channel)
//! ```
//!
//! # Layer rules
//!
//! - `domain` performs no I/O.
//! - `application` depends on `domain` only.
//! - `infrastructure` depends on all other layers plus `tokio` and `tcpbus-core`.

/// Domain layer: configuration, descriptors and session identity (no I/O).
pub mod domain;

/// Application layer: session bookkeeping.
pub mod application;

/// Infrastructure layer: TCP listener, sessions and descriptor files.
pub mod infrastructure;
