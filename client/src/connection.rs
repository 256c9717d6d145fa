//! Connection lifecycle handling: turns server messages and transport
//! events into remote entity creation, updates, and teardown.

use crate::remote::RemoteEntityStore;
use crate::rendering::AvatarRenderer;
use log::{debug, info, warn};
use shared::{PlayerId, PlayerSnapshot, ServerMessage};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected { local_id: PlayerId },
}

/// Client-side sync state for one transport connection
pub struct SyncClient<R: AvatarRenderer> {
    state: ConnectionState,
    store: RemoteEntityStore,
    renderer: R,
    /// Drop peers locally after this much silence
    peer_timeout: Option<Duration>,
}

impl<R: AvatarRenderer> SyncClient<R> {
    /// `interval` is the publish cadence shared by every client.
    pub fn new(renderer: R, interval: Duration, peer_timeout: Option<Duration>) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            store: RemoteEntityStore::new(interval),
            renderer,
            peer_timeout,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn local_id(&self) -> Option<PlayerId> {
        match self.state {
            ConnectionState::Connected { local_id } => Some(local_id),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.local_id().is_some()
    }

    pub fn store(&self) -> &RemoteEntityStore {
        &self.store
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    /// Disconnected -> Connecting. Returns false if already connecting or
    /// connected.
    pub fn begin_connect(&mut self) -> bool {
        if self.state != ConnectionState::Disconnected {
            return false;
        }
        self.state = ConnectionState::Connecting;
        true
    }

    /// Decodes and applies one text frame from the server.
    pub fn handle_text(&mut self, text: &str, now: Instant) {
        match shared::decode_server(text) {
            Ok(message) => self.handle_message(message, now),
            Err(e) => warn!("Ignoring message from server: {}", e),
        }
    }

    pub fn handle_message(&mut self, message: ServerMessage, now: Instant) {
        if let ServerMessage::Init { id } = message {
            self.bind(id);
            return;
        }

        let Some(local_id) = self.local_id() else {
            debug!("Ignoring {:?} before init", message);
            return;
        };

        match message {
            ServerMessage::Init { .. } => {}
            ServerMessage::PlayersList { players } => {
                info!("Roster received with {} players", players.len());
                for snapshot in &players {
                    self.add_peer(local_id, snapshot, now);
                }
            }
            ServerMessage::PlayerJoined(snapshot) => {
                info!("Player {} joined", snapshot.id);
                self.add_peer(local_id, &snapshot, now);
            }
            ServerMessage::PlayerUpdate(snapshot) => {
                if snapshot.id == local_id {
                    return;
                }
                if self.store.apply_update(&snapshot, now) {
                    if let Some(entity) = self.store.get(snapshot.id) {
                        self.renderer.spawn(snapshot.id, &entity.pose());
                    }
                }
            }
            ServerMessage::PlayerAction { id, action } => {
                if id != local_id && self.store.contains(id) {
                    self.renderer.action(id, &action);
                }
            }
            ServerMessage::PlayerLeft { id } => {
                info!("Player {} left", id);
                self.remove_peer(id);
            }
        }
    }

    /// Transport dropped: no peer data survives, a reconnect starts from a
    /// fresh roster.
    pub fn handle_disconnected(&mut self, reason: &str) {
        if self.state != ConnectionState::Disconnected {
            info!("Disconnected: {}", reason);
        }
        self.state = ConnectionState::Disconnected;
        for id in self.store.clear() {
            self.renderer.despawn(id);
        }
    }

    /// Per-frame step: interpolate every peer and hand the result to the
    /// renderer.
    pub fn render_frame(&mut self, now: Instant) {
        if let Some(timeout) = self.peer_timeout {
            for id in self.store.stale_ids(now, timeout) {
                info!("Player {} went silent, dropping", id);
                self.remove_peer(id);
            }
        }

        self.store.interpolate(now);
        self.renderer.begin_frame();
        for entity in self.store.iter() {
            self.renderer.place(entity.id, &entity.pose());
        }
    }

    fn bind(&mut self, id: PlayerId) {
        if self.state != ConnectionState::Connecting {
            warn!("Unexpected init in state {:?}", self.state);
        }
        // A re-init means a new session; forget whatever we knew.
        for peer in self.store.clear() {
            self.renderer.despawn(peer);
        }
        info!("Connected! Player ID: {}", id);
        self.state = ConnectionState::Connected { local_id: id };
    }

    fn add_peer(&mut self, local_id: PlayerId, snapshot: &PlayerSnapshot, now: Instant) {
        if snapshot.id == local_id {
            return;
        }
        if !self.store.insert(snapshot, now) {
            debug!("Player {} already known, keeping its samples", snapshot.id);
            return;
        }
        if let Some(entity) = self.store.get(snapshot.id) {
            self.renderer.spawn(snapshot.id, &entity.pose());
        }
    }

    fn remove_peer(&mut self, id: PlayerId) {
        if self.store.remove(id).is_some() {
            self.renderer.despawn(id);
        }
    }
}
