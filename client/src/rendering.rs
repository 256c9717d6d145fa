//! Boundary to the rendering collaborator

use crate::remote::RenderedPose;
use log::{debug, info};
use serde_json::{Map, Value};
use shared::PlayerId;

/// Places peer avatars. The sync layer owns *where* a peer is; everything
/// about *how* it looks lives behind this trait.
pub trait AvatarRenderer {
    /// Called at the start of every frame, before any `place`.
    fn begin_frame(&mut self) {}
    /// A peer became known; allocate its avatar.
    fn spawn(&mut self, id: PlayerId, pose: &RenderedPose);
    /// Called once per frame per known peer with the interpolated pose.
    fn place(&mut self, id: PlayerId, pose: &RenderedPose);
    /// The peer is gone; release everything owned by its avatar.
    fn despawn(&mut self, id: PlayerId);
    /// A peer performed an action (e.g. fired). Ignored by default.
    fn action(&mut self, _id: PlayerId, _action: &Map<String, Value>) {}
}

/// Headless renderer that logs what a real one would draw
pub struct LogRenderer {
    frame: u64,
    /// Log peer positions every this many frames
    log_every: u64,
}

impl LogRenderer {
    pub fn new(log_every: u64) -> Self {
        Self {
            frame: 0,
            log_every: log_every.max(1),
        }
    }

    fn should_log(&self) -> bool {
        self.frame % self.log_every == 0
    }
}

impl AvatarRenderer for LogRenderer {
    fn begin_frame(&mut self) {
        self.frame += 1;
    }

    fn spawn(&mut self, id: PlayerId, pose: &RenderedPose) {
        info!(
            "Spawned avatar for player {} at ({:.2}, {:.2}, {:.2})",
            id, pose.position.x, pose.position.y, pose.position.z
        );
    }

    fn place(&mut self, id: PlayerId, pose: &RenderedPose) {
        if self.should_log() {
            debug!(
                "Player {} at ({:.2}, {:.2}, {:.2}) yaw {:.2} pitch {:.2}{}{}",
                id,
                pose.position.x,
                pose.position.y,
                pose.position.z,
                pose.direction.yaw(),
                pose.vertical_look,
                if pose.flags.is_moving() { " moving" } else { "" },
                if pose.is_aiming_down_sights { " aiming" } else { "" },
            );
        }
    }

    fn despawn(&mut self, id: PlayerId) {
        info!("Despawned avatar for player {}", id);
    }

    fn action(&mut self, id: PlayerId, action: &Map<String, Value>) {
        info!("Player {} action: {}", id, Value::Object(action.clone()));
    }
}
