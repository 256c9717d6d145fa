//! Authoritative session bookkeeping for the relay server
//!
//! This module owns the mapping from connection identifier to participant
//! state. It handles:
//! - Session lifecycle (create on connect, update on message, remove on
//!   disconnect or timeout)
//! - Unique id allocation and capacity enforcement
//! - Staleness detection for the liveness sweep
//!
//! The registry itself never sends anything; fan-out lives in the relay.

use log::info;
use shared::{PlayerId, PlayerSnapshot, PlayerState, ServerMessage};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// The owning side of one transport connection.
///
/// Implementations must not block: the relay calls these from its single
/// event loop while handling a message.
pub trait Endpoint {
    /// Queues a message for delivery on this connection.
    fn send(&self, message: &ServerMessage);
    /// Asks the transport to close the connection with the given reason.
    fn close(&self, reason: &str);
}

/// Server-side record of one connected participant
#[derive(Debug)]
pub struct Session<E> {
    /// Identifier assigned by the server at connect time
    pub id: PlayerId,
    /// Last accepted pose, zeroed until the first update arrives
    pub state: PlayerState,
    /// Time of the most recently accepted message
    pub last_update: Instant,
    /// Time of the most recently accepted pose update; actions do not move it
    pub last_accepted_update: Instant,
    /// Number of pose updates accepted so far
    pub accepted_updates: u64,
    /// Transport handle used for delivery and forced close
    pub endpoint: E,
}

impl<E> Session<E> {
    pub fn new(id: PlayerId, endpoint: E, now: Instant) -> Self {
        Self {
            id,
            state: PlayerState::default(),
            last_update: now,
            last_accepted_update: now,
            accepted_updates: 0,
            endpoint,
        }
    }

    /// Marks the session alive as of `now`.
    pub fn touch(&mut self, now: Instant) {
        self.last_update = self.last_update.max(now);
    }

    /// Returns true if nothing was accepted from this session within `timeout`.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_update) > timeout
    }

    pub fn snapshot(&self) -> PlayerSnapshot {
        PlayerSnapshot {
            id: self.id,
            state: self.state,
        }
    }
}

/// Owns every live session, keyed by id
///
/// Ids increase monotonically and are never reused for the lifetime of
/// the registry. Sessions are kept ordered by id so rosters list
/// participants in join order.
pub struct SessionRegistry<E> {
    sessions: BTreeMap<PlayerId, Session<E>>,
    next_id: PlayerId,
    max_sessions: usize,
}

impl<E> SessionRegistry<E> {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: BTreeMap::new(),
            next_id: 1,
            max_sessions,
        }
    }

    /// Allocates a fresh id and inserts a default session for it.
    ///
    /// Fails when the registry is at capacity, handing the endpoint back
    /// so the caller can still close it.
    pub fn insert(&mut self, endpoint: E, now: Instant) -> Result<PlayerId, E> {
        if self.sessions.len() >= self.max_sessions {
            return Err(endpoint);
        }

        let id = self.next_id;
        self.next_id += 1;

        self.sessions.insert(id, Session::new(id, endpoint, now));
        info!("Session {} registered ({} live)", id, self.sessions.len());

        Ok(id)
    }

    /// Removes a session. A second call for the same id is a no-op that
    /// returns None, which is what keeps eviction idempotent.
    pub fn remove(&mut self, id: PlayerId) -> Option<Session<E>> {
        let removed = self.sessions.remove(&id);
        if removed.is_some() {
            info!("Session {} removed ({} live)", id, self.sessions.len());
        }
        removed
    }

    pub fn get(&self, id: PlayerId) -> Option<&Session<E>> {
        self.sessions.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Session<E>> {
        self.sessions.get_mut(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Every live session except `exclude`, in id order.
    pub fn others(&self, exclude: PlayerId) -> impl Iterator<Item = &Session<E>> {
        self.sessions
            .values()
            .filter(move |session| session.id != exclude)
    }

    /// Roster as seen by `exclude`: everyone but themselves.
    pub fn snapshots_except(&self, exclude: PlayerId) -> Vec<PlayerSnapshot> {
        self.others(exclude).map(Session::snapshot).collect()
    }

    /// Ids of sessions silent for longer than `timeout`.
    pub fn stale_ids(&self, now: Instant, timeout: Duration) -> Vec<PlayerId> {
        self.sessions
            .values()
            .filter(|session| session.is_stale(now, timeout))
            .map(|session| session.id)
            .collect()
    }

    /// Removes and returns every session, used on shutdown.
    pub fn drain(&mut self) -> Vec<Session<E>> {
        std::mem::take(&mut self.sessions).into_values().collect()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.sessions.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }
}
