//! Application layer for tcpbus-server.
//!
//! - **`session_registry`** – The arena every listener keeps of its live
//!   sessions.  Sessions register themselves on creation and are removed by
//!   their own worker once teardown has finished, so the registry is the
//!   single place to ask "what is still alive?".

pub mod session_registry;

pub use session_registry::{SessionRecord, SessionRegistry};
