//! Relay engine: applies client messages to the session registry and fans
//! them out to every other live session.
//!
//! The relay performs no simulation. Each client is authoritative over its
//! own pose; the server only validates that the numbers are usable (and,
//! optionally, plausible) before storing and forwarding them.

use crate::registry::{Endpoint, SessionRegistry};
use log::{debug, info, warn};
use serde_json::{Map, Value};
use shared::{
    ClientMessage, PlayerId, PlayerSnapshot, PlayerState, ProtocolError, ServerMessage,
    DEFAULT_MAX_PLAYERS, OUTBOUND_INTERVAL, SESSION_TIMEOUT,
};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Silence after which the liveness sweep evicts a session
    pub session_timeout: Duration,
    pub max_players: usize,
    /// Upper bound on movement speed in world units per second; None
    /// disables the plausibility check
    pub max_speed: Option<f32>,
    /// Expected client publish cadence, the minimum window the speed
    /// check allows per update
    pub outbound_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            session_timeout: SESSION_TIMEOUT,
            max_players: DEFAULT_MAX_PLAYERS,
            max_speed: None,
            outbound_interval: OUTBOUND_INTERVAL,
        }
    }
}

/// Why an inbound message was dropped instead of relayed
#[derive(Debug, Error)]
pub enum RejectReason {
    #[error("no live session")]
    UnknownSession,
    #[error(transparent)]
    Invalid(#[from] ProtocolError),
    #[error("moved {distance:.2} units, at most {allowed:.2} allowed")]
    Implausible { distance: f32, allowed: f32 },
}

pub struct Relay<E: Endpoint> {
    registry: SessionRegistry<E>,
    config: RelayConfig,
}

impl<E: Endpoint> Relay<E> {
    pub fn new(config: RelayConfig) -> Self {
        Self {
            registry: SessionRegistry::new(config.max_players),
            config,
        }
    }

    pub fn registry(&self) -> &SessionRegistry<E> {
        &self.registry
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Registers a new connection.
    ///
    /// The newcomer receives `init` then one batched `players-list`; every
    /// other session receives `player-joined`. Returns None and closes the
    /// endpoint when the server is full.
    pub fn on_connect(&mut self, endpoint: E, now: Instant) -> Option<PlayerId> {
        let id = match self.registry.insert(endpoint, now) {
            Ok(id) => id,
            Err(endpoint) => {
                warn!(
                    "Rejecting connection: server full ({} players)",
                    self.registry.max_sessions()
                );
                endpoint.close("server full");
                return None;
            }
        };

        let (roster, joined) = match self.registry.get(id) {
            Some(session) => {
                session.endpoint.send(&ServerMessage::Init { id });
                (self.registry.snapshots_except(id), session.snapshot())
            }
            None => return None,
        };

        info!("Player {} joined, sending roster of {}", id, roster.len());
        if let Some(session) = self.registry.get(id) {
            session
                .endpoint
                .send(&ServerMessage::PlayersList { players: roster });
        }

        self.broadcast_except(id, &ServerMessage::PlayerJoined(joined));
        Some(id)
    }

    /// Decodes one text frame from `id` and dispatches it.
    ///
    /// Nothing here is fatal: malformed or rejected messages are logged and
    /// dropped.
    pub fn on_message(&mut self, id: PlayerId, text: &str, now: Instant) {
        let message = match shared::decode_client(text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping message from player {}: {}", id, e);
                return;
            }
        };

        let result = match message {
            ClientMessage::PlayerUpdate(state) => self.on_update(id, state, now),
            ClientMessage::PlayerAction { action } => self.on_action(id, action, now),
        };

        match result {
            Ok(()) => {}
            Err(RejectReason::UnknownSession) => {
                debug!("Ignoring message for evicted player {}", id);
            }
            Err(reason) => warn!("Rejected update from player {}: {}", id, reason),
        }
    }

    /// Stores a pose update and relays it to everyone but the sender.
    pub fn on_update(
        &mut self,
        id: PlayerId,
        state: PlayerState,
        now: Instant,
    ) -> Result<(), RejectReason> {
        let max_speed = self.config.max_speed;
        let min_window = self.config.outbound_interval;

        let session = self
            .registry
            .get_mut(id)
            .ok_or(RejectReason::UnknownSession)?;

        state.validate()?;

        if let Some(max_speed) = max_speed {
            // The first update places the player at spawn, so it is exempt.
            if session.accepted_updates > 0 {
                let elapsed = now.saturating_duration_since(session.last_accepted_update);
                let allowed = max_speed * elapsed.max(min_window).as_secs_f32();
                let distance = session.state.position.distance(state.position);
                if distance > allowed {
                    return Err(RejectReason::Implausible { distance, allowed });
                }
            }
        }

        session.state = state;
        session.accepted_updates += 1;
        session.last_accepted_update = session.last_accepted_update.max(now);
        session.touch(now);

        self.broadcast_except(id, &ServerMessage::PlayerUpdate(PlayerSnapshot { id, state }));
        Ok(())
    }

    /// Relays an opaque action (e.g. a shot) with the sender's id injected.
    pub fn on_action(
        &mut self,
        id: PlayerId,
        mut action: Map<String, Value>,
        now: Instant,
    ) -> Result<(), RejectReason> {
        let session = self
            .registry
            .get_mut(id)
            .ok_or(RejectReason::UnknownSession)?;
        session.touch(now);

        // Clients cannot speak for someone else.
        action.remove("id");
        self.broadcast_except(id, &ServerMessage::PlayerAction { id, action });
        Ok(())
    }

    /// Removes a session and announces `player-left` to the rest.
    ///
    /// Returns false, without broadcasting, if the session was already gone.
    pub fn on_disconnect(&mut self, id: PlayerId, reason: &str) -> bool {
        if self.registry.remove(id).is_none() {
            return false;
        }

        info!("Player {} left: {}", id, reason);
        self.broadcast_except(id, &ServerMessage::PlayerLeft { id });
        true
    }

    /// Liveness sweep: force-closes and evicts every stale session.
    pub fn sweep(&mut self, now: Instant) -> Vec<PlayerId> {
        let stale = self
            .registry
            .stale_ids(now, self.config.session_timeout);

        for id in &stale {
            if let Some(session) = self.registry.get(*id) {
                info!("Player {} timed out", id);
                session.endpoint.close("timeout");
            }
            self.on_disconnect(*id, "timeout");
        }

        stale
    }

    /// Closes every endpoint and empties the registry.
    pub fn shutdown(&mut self, reason: &str) {
        let sessions = self.registry.drain();
        info!("Closing {} sessions: {}", sessions.len(), reason);
        for session in sessions {
            session.endpoint.close(reason);
        }
    }

    fn broadcast_except(&self, exclude: PlayerId, message: &ServerMessage) {
        for session in self.registry.others(exclude) {
            session.endpoint.send(message);
        }
    }
}
