//! Domain layer for tcpbus-server.
//!
//! The domain layer contains plain types with no dependency on sockets or the
//! async runtime:
//!
//! - Descriptor schema (what an operator writes in the TOML file)
//! - Validated listener configuration
//! - Session identity, lifecycle states and status snapshots

pub mod config;
pub mod descriptor;
pub mod session;

pub use config::{ConfigError, ListenerConfig};
pub use descriptor::{InstanceDescriptor, ServerDescriptor, UPLINK_ENDPOINT};
pub use session::{SessionId, SessionInfo, SessionState};
