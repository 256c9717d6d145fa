use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use thiserror::Error;

/// How often a client publishes its local pose (~20 Hz).
pub const OUTBOUND_INTERVAL: Duration = Duration::from_millis(50);
/// Period of the server's liveness sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10);
/// A session silent for longer than this is evicted. 3x the sweep period.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_PLAYERS: usize = 32;

pub type PlayerId = u32;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);
    /// Facing used for freshly connected players (looking down -Z).
    pub const FORWARD: Vec3 = Vec3::new(0.0, 0.0, -1.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn lerp(self, other: Vec3, t: f32) -> Vec3 {
        Vec3 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    pub fn length(self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(self, other: Vec3) -> f32 {
        Vec3::new(other.x - self.x, other.y - self.y, other.z - self.z).length()
    }

    /// Returns the unit vector, or `fallback` when the length is ~0
    /// (e.g. lerping between two opposite directions at t = 0.5).
    pub fn normalize_or(self, fallback: Vec3) -> Vec3 {
        let len = self.length();
        if len > 1e-6 {
            Vec3::new(self.x / len, self.y / len, self.z / len)
        } else {
            fallback
        }
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Builds a forward-direction vector from yaw (around +Y, 0 = -Z) and pitch.
    pub fn from_yaw_pitch(yaw: f32, pitch: f32) -> Vec3 {
        Vec3::new(
            -yaw.sin() * pitch.cos(),
            pitch.sin(),
            -yaw.cos() * pitch.cos(),
        )
    }

    /// Body yaw a renderer should apply for this forward direction.
    pub fn yaw(self) -> f32 {
        (-self.x).atan2(-self.z)
    }
}

/// Independent movement booleans, only used to pick remote animations.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MovementFlags {
    pub move_forward: bool,
    pub move_backward: bool,
    pub move_left: bool,
    pub move_right: bool,
    pub is_sprinting: bool,
}

impl MovementFlags {
    pub fn is_moving(&self) -> bool {
        self.move_forward || self.move_backward || self.move_left || self.move_right
    }
}

/// The pose a client publishes and the server stores per session.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerState {
    pub position: Vec3,
    pub direction: Vec3,
    #[serde(default)]
    pub vertical_look: f32,
    #[serde(flatten)]
    pub flags: MovementFlags,
    #[serde(default)]
    pub is_aiming_down_sights: bool,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            direction: Vec3::FORWARD,
            vertical_look: 0.0,
            flags: MovementFlags::default(),
            is_aiming_down_sights: false,
        }
    }
}

impl PlayerState {
    pub fn at(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Rejects NaN and infinities so one bad client cannot corrupt what
    /// every other client observes.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if !self.position.is_finite() {
            return Err(ProtocolError::NonFinite("position"));
        }
        if !self.direction.is_finite() {
            return Err(ProtocolError::NonFinite("direction"));
        }
        if !self.vertical_look.is_finite() {
            return Err(ProtocolError::NonFinite("verticalLook"));
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct PlayerSnapshot {
    pub id: PlayerId,
    #[serde(flatten)]
    pub state: PlayerState,
}

/// Messages a client sends. The sender's id is never trusted from the
/// payload; the server injects it on relay.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    PlayerUpdate(PlayerState),
    PlayerAction {
        #[serde(flatten)]
        action: Map<String, Value>,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Init {
        id: PlayerId,
    },
    PlayersList {
        players: Vec<PlayerSnapshot>,
    },
    PlayerJoined(PlayerSnapshot),
    PlayerUpdate(PlayerSnapshot),
    PlayerAction {
        id: PlayerId,
        #[serde(flatten)]
        action: Map<String, Value>,
    },
    PlayerLeft {
        id: PlayerId,
    },
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("non-finite value in `{0}`")]
    NonFinite(&'static str),
}

pub fn encode<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

pub fn decode_client(text: &str) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

pub fn decode_server(text: &str) -> Result<ServerMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}
