//! Outbound update cadence, decoupled from the render frame rate

use crate::input::PoseSource;
use shared::ClientMessage;
use std::time::{Duration, Instant};

/// Gates local pose publication to a fixed interval no matter how often
/// it is polled.
pub struct UpdateScheduler {
    interval: Duration,
    last_sent: Option<Instant>,
}

impl UpdateScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_sent: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns true when a send is due at `now`, and books it.
    ///
    /// Send times advance in whole intervals so polling at frame rate
    /// does not stretch the average cadence; after a long stall the
    /// schedule restarts from `now` instead of bursting to catch up.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last_sent {
            None => {
                self.last_sent = Some(now);
                true
            }
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < self.interval {
                    return false;
                }
                self.last_sent = Some(if elapsed >= self.interval * 2 {
                    now
                } else {
                    last + self.interval
                });
                true
            }
        }
    }

    /// Samples the local pose into a `player-update` if connected, a send
    /// is due, and the source has a pose.
    pub fn poll_outbound<P: PoseSource>(
        &mut self,
        now: Instant,
        connected: bool,
        source: &mut P,
    ) -> Option<ClientMessage> {
        if !connected || !self.due(now) {
            return None;
        }
        source.sample().map(ClientMessage::PlayerUpdate)
    }

    /// Forgets the schedule, so the first poll after reconnecting sends.
    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{PlayerState, Vec3};

    const INTERVAL: Duration = Duration::from_millis(50);

    struct Fixed(Option<PlayerState>, usize);

    impl PoseSource for Fixed {
        fn sample(&mut self) -> Option<PlayerState> {
            self.1 += 1;
            self.0
        }
    }

    #[test]
    fn test_first_poll_sends() {
        let mut scheduler = UpdateScheduler::new(INTERVAL);
        assert!(scheduler.due(Instant::now()));
    }

    #[test]
    fn test_frame_rate_polling_keeps_cadence() {
        let start = Instant::now();
        let mut scheduler = UpdateScheduler::new(INTERVAL);
        let frame = Duration::from_millis(16);

        // One simulated second at ~60 FPS
        let sends = (0..63)
            .filter(|i| scheduler.due(start + frame * *i))
            .count();

        assert!((19..=21).contains(&sends), "sent {} times", sends);
    }

    #[test]
    fn test_no_burst_after_stall() {
        let start = Instant::now();
        let mut scheduler = UpdateScheduler::new(INTERVAL);
        assert!(scheduler.due(start));

        let resumed = start + Duration::from_secs(2);
        assert!(scheduler.due(resumed));
        assert!(!scheduler.due(resumed + Duration::from_millis(1)));
        assert!(scheduler.due(resumed + INTERVAL));
    }

    #[test]
    fn test_poll_outbound_requires_connection() {
        let now = Instant::now();
        let mut scheduler = UpdateScheduler::new(INTERVAL);
        let mut source = Fixed(Some(PlayerState::at(Vec3::new(1.0, 0.0, 0.0))), 0);

        assert!(scheduler.poll_outbound(now, false, &mut source).is_none());
        assert_eq!(source.1, 0);

        match scheduler.poll_outbound(now, true, &mut source) {
            Some(ClientMessage::PlayerUpdate(state)) => {
                assert_eq!(state.position, Vec3::new(1.0, 0.0, 0.0));
            }
            other => panic!("Expected update, got {:?}", other),
        }
        assert!(scheduler
            .poll_outbound(now + Duration::from_millis(10), true, &mut source)
            .is_none());
    }

    #[test]
    fn test_poll_outbound_without_pose() {
        let mut scheduler = UpdateScheduler::new(INTERVAL);
        let mut source = Fixed(None, 0);
        assert!(scheduler
            .poll_outbound(Instant::now(), true, &mut source)
            .is_none());
        assert_eq!(source.1, 1);
    }

    #[test]
    fn test_reset() {
        let now = Instant::now();
        let mut scheduler = UpdateScheduler::new(INTERVAL);
        assert!(scheduler.due(now));
        assert!(!scheduler.due(now));

        scheduler.reset();
        assert!(scheduler.due(now));
    }
}
