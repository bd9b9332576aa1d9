//! Session identity and lifecycle.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use uuid::Uuid;

/// Unique session identifier: `<listener id>::<uuid v4>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(String);

impl SessionId {
    /// Generates a fresh id scoped to `listener_id`.
    pub fn new(listener_id: &str) -> Self {
        Self(format!("{listener_id}::{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The listener part of the id (everything before the last `::`).
    pub fn listener_id(&self) -> &str {
        self.0
            .rsplit_once("::")
            .map_or(self.0.as_str(), |(listener, _)| listener)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a session.
///
/// States only move forward:
///
/// ```text
/// Created → Started → Running → Exiting → Released
/// ```
///
/// A session may skip states (a failed start goes straight from `Created` to
/// `Released`) but never returns to an earlier one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum SessionState {
    /// Registered, no socket or channel attached yet.
    Created = 0,
    /// Channel connected, worker spawned.
    Started = 1,
    /// Channel open, worker relaying bytes.
    Running = 2,
    /// Teardown in progress; no callbacks are accepted any more.
    Exiting = 3,
    /// Worker finished and the registry entry has been dropped.
    Released = 4,
}

impl SessionState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Created,
            1 => SessionState::Started,
            2 => SessionState::Running,
            3 => SessionState::Exiting,
            _ => SessionState::Released,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Created => "created",
            SessionState::Started => "started",
            SessionState::Running => "running",
            SessionState::Exiting => "exiting",
            SessionState::Released => "released",
        };
        f.write_str(name)
    }
}

/// Point-in-time view of a session, used for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: Option<SocketAddr>,
    pub state: SessionState,
    /// Bytes read from the socket and forwarded to the uplink.
    pub bytes_in: u64,
    /// Bytes written to the socket on behalf of the uplink.
    pub bytes_out: u64,
    pub age: Duration,
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_is_scoped_to_listener() {
        let id = SessionId::new("tcpbus::telnet");

        assert!(id.as_str().starts_with("tcpbus::telnet::"));
        assert_eq!(id.listener_id(), "tcpbus::telnet");
        let uuid_part = id.as_str().rsplit("::").next().unwrap();
        assert!(Uuid::parse_str(uuid_part).is_ok());
    }

    #[test]
    fn test_session_ids_are_unique() {
        let a = SessionId::new("l");
        let b = SessionId::new("l");
        assert_ne!(a, b);
    }

    #[test]
    fn test_states_are_ordered_by_lifecycle() {
        assert!(SessionState::Created < SessionState::Started);
        assert!(SessionState::Running < SessionState::Exiting);
        assert!(SessionState::Exiting < SessionState::Released);
    }

    #[test]
    fn test_state_round_trips_through_u8() {
        for state in [
            SessionState::Created,
            SessionState::Started,
            SessionState::Running,
            SessionState::Exiting,
            SessionState::Released,
        ] {
            assert_eq!(SessionState::from_u8(state as u8), state);
        }
    }
}
