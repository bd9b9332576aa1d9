//! SessionRegistry: in-memory arena of live sessions.
//!
//! Each entry is a [`SessionRecord`] holding the session's lifecycle state and
//! traffic counters in atomics, so the session can update them without taking
//! the registry lock.
//!
//! # Ownership
//!
//! ```text
//! register()  ──►  entry present (Created … Exiting)  ──►  release()
//! ```
//!
//! Only the session's own worker calls [`SessionRegistry::release`], after
//! teardown is complete.  A registry with no entries therefore means every
//! session has fully released its socket and uplink channel.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use crate::domain::{SessionId, SessionInfo, SessionState};

/// Live bookkeeping for one session.
#[derive(Debug)]
pub struct SessionRecord {
    id: SessionId,
    peer: Option<SocketAddr>,
    state: AtomicU8,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    created_at: Instant,
}

impl SessionRecord {
    fn new(id: SessionId, peer: Option<SocketAddr>) -> Self {
        Self {
            id,
            peer,
            state: AtomicU8::new(SessionState::Created as u8),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the state forward to `next`.
    ///
    /// Returns `false` (and changes nothing) if the session is already at or
    /// past `next`.
    pub fn advance_to(&self, next: SessionState) -> bool {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < next as u8).then_some(next as u8)
            })
            .is_ok()
    }

    pub fn add_bytes_in(&self, n: u64) {
        self.bytes_in.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_out(&self, n: u64) {
        self.bytes_out.fetch_add(n, Ordering::Relaxed);
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id.clone(),
            peer: self.peer,
            state: self.state(),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            age: self.created_at.elapsed(),
        }
    }
}

/// Registry of all sessions belonging to one listener.
///
/// Shared between the accept loop and every session worker through an `Arc`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<SessionRecord>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session in the `Created` state and returns its record.
    pub fn register(&self, id: SessionId, peer: Option<SocketAddr>) -> Arc<SessionRecord> {
        let record = Arc::new(SessionRecord::new(id.clone(), peer));
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::clone(&record));
        record
    }

    /// Marks the session `Released` and drops its entry.
    ///
    /// Returns `false` if the id was not registered (already released).
    pub fn release(&self, id: &SessionId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        match removed {
            Some(record) => {
                record.advance_to(SessionState::Released);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    /// Returns a snapshot of one session.
    pub fn get(&self, id: &SessionId) -> Option<SessionInfo> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .map(|record| record.info())
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns snapshots of every live session, oldest first.
    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let mut all: Vec<SessionInfo> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|record| record.info())
            .collect();
        all.sort_by(|a, b| b.age.cmp(&a.age).then_with(|| a.id.cmp(&b.id)));
        all
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
