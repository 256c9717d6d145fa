//! Local pose sources

use rand::Rng;
use shared::{MovementFlags, PlayerState, Vec3};
use std::f32::consts::TAU;
use std::time::Instant;

/// Reports the local player's current pose, or None while there is
/// nothing to publish yet (e.g. the avatar has not spawned).
pub trait PoseSource {
    fn sample(&mut self) -> Option<PlayerState>;
}

/// Headless stand-in for a human: walks a circle around a center point,
/// sprinting on wide circles and aiming on every other lap.
#[derive(Debug, Clone)]
pub struct CirclingBot {
    center: Vec3,
    radius: f32,
    /// Radians per second, negative for clockwise
    angular_speed: f32,
    phase: f32,
    started: Instant,
}

pub const SPRINT_SPEED: f32 = 6.0;

impl CirclingBot {
    pub fn new(center: Vec3, radius: f32, angular_speed: f32, phase: f32) -> Self {
        Self {
            center,
            radius,
            angular_speed,
            phase,
            started: Instant::now(),
        }
    }

    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let center = Vec3::new(rng.gen_range(-20.0..20.0), 0.0, rng.gen_range(-20.0..20.0));
        let radius = rng.gen_range(2.0..8.0);
        let speed = rng.gen_range(0.3..1.2) * if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
        Self::new(center, radius, speed, rng.gen_range(0.0..TAU))
    }

    /// Pose after `elapsed` seconds on the circle.
    pub fn pose_at(&self, elapsed: f32) -> PlayerState {
        let angle = self.phase + self.angular_speed * elapsed;
        let position = Vec3::new(
            self.center.x + self.radius * angle.cos(),
            self.center.y,
            self.center.z + self.radius * angle.sin(),
        );

        // Tangent of the circle in the direction of travel
        let sign = self.angular_speed.signum();
        let direction =
            Vec3::new(-angle.sin() * sign, 0.0, angle.cos() * sign).normalize_or(Vec3::FORWARD);

        let lap = (self.angular_speed.abs() * elapsed / TAU) as u64;

        PlayerState {
            position,
            direction,
            vertical_look: 0.2 * (elapsed * 0.5).sin(),
            flags: MovementFlags {
                move_forward: self.angular_speed != 0.0,
                is_sprinting: self.speed() > SPRINT_SPEED,
                ..MovementFlags::default()
            },
            is_aiming_down_sights: lap % 2 == 1,
        }
    }

    /// Linear speed along the circle.
    pub fn speed(&self) -> f32 {
        self.radius * self.angular_speed.abs()
    }
}

impl PoseSource for CirclingBot {
    fn sample(&mut self) -> Option<PlayerState> {
        Some(self.pose_at(self.started.elapsed().as_secs_f32()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bot_stays_on_circle() {
        let bot = CirclingBot::new(Vec3::new(5.0, 1.0, -5.0), 3.0, 1.0, 0.0);

        for step in 0..20 {
            let pose = bot.pose_at(step as f32 * 0.37);
            assert_approx_eq!(pose.position.distance(Vec3::new(5.0, 1.0, -5.0)), 3.0, 1e-4);
            assert_approx_eq!(pose.direction.length(), 1.0, 1e-5);
            assert!(pose.validate().is_ok());
        }
    }

    #[test]
    fn test_bot_faces_direction_of_travel() {
        let bot = CirclingBot::new(Vec3::ZERO, 4.0, 0.5, 0.0);

        let a = bot.pose_at(1.0);
        let b = bot.pose_at(1.01);
        let travel = Vec3::new(
            b.position.x - a.position.x,
            0.0,
            b.position.z - a.position.z,
        )
        .normalize_or(Vec3::FORWARD);

        let dot = travel.x * a.direction.x + travel.z * a.direction.z;
        assert!(dot > 0.99, "bot should face where it walks, dot = {}", dot);
    }

    #[test]
    fn test_bot_flags() {
        let slow = CirclingBot::new(Vec3::ZERO, 2.0, 1.0, 0.0);
        let pose = slow.pose_at(0.0);
        assert!(pose.flags.move_forward);
        assert!(!pose.flags.is_sprinting);
        assert!(!pose.is_aiming_down_sights);

        let fast = CirclingBot::new(Vec3::ZERO, 8.0, 1.0, 0.0);
        assert!(fast.pose_at(0.0).flags.is_sprinting);

        // Second lap aims
        assert!(slow.pose_at(TAU + 0.1).is_aiming_down_sights);
    }

    #[test]
    fn test_random_bot_is_valid() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..10 {
            let mut bot = CirclingBot::random(&mut rng);
            assert!(bot.speed() > 0.0);
            let pose = bot.sample().unwrap();
            assert!(pose.validate().is_ok());
        }
    }
}
