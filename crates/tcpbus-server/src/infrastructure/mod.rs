//! Infrastructure layer for tcpbus-server.
//!
//! The infrastructure layer handles all I/O: binding and accepting TCP
//! connections, relaying bytes to and from the uplink channel, and reading
//! the descriptor file.
//!
//! # Responsibilities
//!
//! - Binding a TCP listener per configured instance
//! - Spawning one accept-loop task per listener
//! - Spawning one worker task per accepted connection
//! - Tearing sessions down exactly once, whoever triggers it
//!
//! # What does NOT belong here?
//!
//! - Setting validation (that is the domain layer)
//! - Session bookkeeping (that is the application layer)
//! - Command-line parsing (that is done in `main.rs`)

pub mod descriptor_file;
pub mod listener;
pub mod session;

pub use descriptor_file::{load_descriptor, DescriptorError};
pub use listener::{Listener, ListenerError, ListenerHandle};
pub use session::{Session, SessionContext, SessionError};
