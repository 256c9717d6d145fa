//! Performance benchmarks for the relay hot path and client interpolation

use client::remote::RemoteEntityStore;
use server::registry::Endpoint;
use server::relay::{Relay, RelayConfig};
use shared::{ClientMessage, PlayerSnapshot, PlayerState, ServerMessage, Vec3};
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Endpoint that only counts deliveries
#[derive(Clone, Default)]
struct Counter {
    sent: Rc<Cell<usize>>,
}

impl Endpoint for Counter {
    fn send(&self, message: &ServerMessage) {
        // Pay for serialization like the real transport does
        let _ = shared::encode(message);
        self.sent.set(self.sent.get() + 1);
    }

    fn close(&self, _reason: &str) {}
}

fn sample_state(i: usize) -> PlayerState {
    let angle = i as f32 * 0.1;
    let mut state = PlayerState::at(Vec3::new(angle.cos() * 5.0, 0.0, angle.sin() * 5.0));
    state.direction = Vec3::from_yaw_pitch(angle, 0.0);
    state.flags.move_forward = true;
    state
}

/// Benchmarks wire encoding and decoding of pose updates
#[test]
fn benchmark_codec() {
    let iterations = 20_000;
    let message = ClientMessage::PlayerUpdate(sample_state(7));
    let start = Instant::now();

    for _ in 0..iterations {
        let text = shared::encode(&message).unwrap();
        let decoded = shared::decode_client(&text).unwrap();
        assert_eq!(decoded, message);
    }

    let duration = start.elapsed();
    println!(
        "Codec round trip: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks update fan-out with a full server
#[test]
fn benchmark_relay_fan_out() {
    let players = 32;
    let mut relay = Relay::new(RelayConfig {
        max_players: players,
        ..RelayConfig::default()
    });
    let counter = Counter::default();
    let now = Instant::now();

    let ids: Vec<_> = (0..players)
        .filter_map(|_| relay.on_connect(counter.clone(), now))
        .collect();
    assert_eq!(ids.len(), players);

    counter.sent.set(0);
    let rounds = 100;
    let start = Instant::now();

    for round in 0..rounds {
        let tick = now + Duration::from_millis(50 * (round as u64 + 1));
        for (i, id) in ids.iter().enumerate() {
            let text = shared::encode(&ClientMessage::PlayerUpdate(sample_state(round + i)))
                .unwrap();
            relay.on_message(*id, &text, tick);
        }
    }

    let duration = start.elapsed();
    let expected = rounds * players * (players - 1);
    println!(
        "Relay fan-out: {} deliveries in {:?} ({:.2} μs/delivery)",
        expected,
        duration,
        duration.as_micros() as f64 / expected as f64
    );

    assert_eq!(counter.sent.get(), expected);
    // 100 rounds of a full server, under 5 seconds even unoptimized
    assert!(duration.as_millis() < 5000);
}

/// Benchmarks the liveness sweep over a full registry
#[test]
fn benchmark_sweep() {
    let mut relay = Relay::new(RelayConfig {
        max_players: 1000,
        ..RelayConfig::default()
    });
    let now = Instant::now();
    for _ in 0..1000 {
        relay.on_connect(Counter::default(), now);
    }

    let iterations = 1000;
    let start = Instant::now();
    for i in 0..iterations {
        let evicted = relay.sweep(now + Duration::from_millis(i));
        assert!(evicted.is_empty());
    }

    let duration = start.elapsed();
    println!(
        "Liveness sweep: {} sweeps of 1000 sessions in {:?}",
        iterations, duration
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks per-frame interpolation for many remote players
#[test]
fn benchmark_interpolation() {
    let interval = Duration::from_millis(50);
    let mut store = RemoteEntityStore::new(interval);
    let start_time = Instant::now();

    for id in 0..100 {
        store.insert(
            &PlayerSnapshot {
                id,
                state: sample_state(id as usize),
            },
            start_time,
        );
    }

    let frames = 1000;
    let frame = Duration::from_millis(16);
    let start = Instant::now();

    for f in 0..frames {
        let now = start_time + frame * f;
        if f % 3 == 0 {
            for id in 0..100 {
                store.apply_update(
                    &PlayerSnapshot {
                        id,
                        state: sample_state((id + f) as usize),
                    },
                    now,
                );
            }
        }
        store.interpolate(now);
    }

    let duration = start.elapsed();
    println!(
        "Interpolation: {} frames x 100 players in {:?} ({:.2} μs/frame)",
        frames,
        duration,
        duration.as_micros() as f64 / frames as f64
    );

    for entity in store.iter() {
        let pose = entity.pose();
        assert!(pose.position.is_finite());
        assert!((pose.direction.length() - 1.0).abs() < 1e-3);
    }

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}
