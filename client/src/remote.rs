//! Remote entity store: per-peer interpolation state

use shared::{MovementFlags, PlayerId, PlayerSnapshot, PlayerState, Vec3};
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// What the renderer is handed for one peer on one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderedPose {
    pub position: Vec3,
    pub direction: Vec3,
    pub vertical_look: f32,
    pub flags: MovementFlags,
    pub is_aiming_down_sights: bool,
}

/// Client-side view of one peer.
///
/// Each interpolation segment runs from `confirmed_*` to `target_*` and
/// spans exactly one inbound sample interval.
#[derive(Debug, Clone)]
pub struct RemoteEntity {
    pub id: PlayerId,

    pub confirmed_position: Vec3,
    pub confirmed_direction: Vec3,
    pub confirmed_vertical_look: f32,

    pub target_position: Vec3,
    pub target_direction: Vec3,
    pub target_vertical_look: f32,

    pub rendered_position: Vec3,
    pub rendered_direction: Vec3,
    pub rendered_vertical_look: f32,

    pub flags: MovementFlags,
    pub is_aiming_down_sights: bool,
    pub last_receipt: Instant,
}

impl RemoteEntity {
    /// A new entity starts at rest on its first sample, so the first
    /// frame shows no interpolation artifact.
    pub fn new(snapshot: &PlayerSnapshot, now: Instant) -> Self {
        let state = &snapshot.state;
        Self {
            id: snapshot.id,
            confirmed_position: state.position,
            confirmed_direction: state.direction,
            confirmed_vertical_look: state.vertical_look,
            target_position: state.position,
            target_direction: state.direction,
            target_vertical_look: state.vertical_look,
            rendered_position: state.position,
            rendered_direction: state.direction,
            rendered_vertical_look: state.vertical_look,
            flags: state.flags,
            is_aiming_down_sights: state.is_aiming_down_sights,
            last_receipt: now,
        }
    }

    /// Starts a new segment: the previous target becomes the start point.
    pub fn push_sample(&mut self, state: &PlayerState, now: Instant) {
        self.confirmed_position = self.target_position;
        self.confirmed_direction = self.target_direction;
        self.confirmed_vertical_look = self.target_vertical_look;

        self.target_position = state.position;
        self.target_direction = state.direction;
        self.target_vertical_look = state.vertical_look;

        self.flags = state.flags;
        self.is_aiming_down_sights = state.is_aiming_down_sights;
        self.last_receipt = now;
    }

    /// Progress through the current segment, clamped to [0, 1]. Never
    /// extrapolates: a peer whose updates stop freezes on its last target.
    pub fn interpolation_fraction(&self, now: Instant, interval: Duration) -> f32 {
        if interval.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.last_receipt);
        (elapsed.as_secs_f32() / interval.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn interpolate(&mut self, now: Instant, interval: Duration) {
        let t = self.interpolation_fraction(now, interval);

        self.rendered_position = self.confirmed_position.lerp(self.target_position, t);
        self.rendered_direction = self
            .confirmed_direction
            .lerp(self.target_direction, t)
            .normalize_or(self.target_direction);
        self.rendered_vertical_look = self.confirmed_vertical_look
            + (self.target_vertical_look - self.confirmed_vertical_look) * t;
    }

    pub fn pose(&self) -> RenderedPose {
        RenderedPose {
            position: self.rendered_position,
            direction: self.rendered_direction,
            vertical_look: self.rendered_vertical_look,
            flags: self.flags,
            is_aiming_down_sights: self.is_aiming_down_sights,
        }
    }
}

/// Every known peer, keyed by id
pub struct RemoteEntityStore {
    entities: BTreeMap<PlayerId, RemoteEntity>,
    interval: Duration,
}

impl RemoteEntityStore {
    /// `interval` is the peers' publish cadence, the length of one
    /// interpolation segment.
    pub fn new(interval: Duration) -> Self {
        Self {
            entities: BTreeMap::new(),
            interval,
        }
    }

    /// Records a peer announced by a roster or join. An already known
    /// peer keeps its samples, since a join can trail the peer's first
    /// update. Returns true if newly created.
    pub fn insert(&mut self, snapshot: &PlayerSnapshot, now: Instant) -> bool {
        match self.entities.entry(snapshot.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(RemoteEntity::new(snapshot, now));
                true
            }
        }
    }

    /// Applies an inbound update, creating the entity if the update raced
    /// ahead of its join. Returns true if the entity was created.
    pub fn apply_update(&mut self, snapshot: &PlayerSnapshot, now: Instant) -> bool {
        match self.entities.get_mut(&snapshot.id) {
            Some(entity) => {
                entity.push_sample(&snapshot.state, now);
                false
            }
            None => {
                self.entities
                    .insert(snapshot.id, RemoteEntity::new(snapshot, now));
                true
            }
        }
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<RemoteEntity> {
        self.entities.remove(&id)
    }

    /// Drops every entity, returning the ids that were known.
    pub fn clear(&mut self) -> Vec<PlayerId> {
        std::mem::take(&mut self.entities).into_keys().collect()
    }

    /// Advances every rendered sample toward its target.
    pub fn interpolate(&mut self, now: Instant) {
        let interval = self.interval;
        for entity in self.entities.values_mut() {
            entity.interpolate(now, interval);
        }
    }

    /// Peers not heard from for longer than `timeout`.
    pub fn stale_ids(&self, now: Instant, timeout: Duration) -> Vec<PlayerId> {
        self.entities
            .values()
            .filter(|e| now.saturating_duration_since(e.last_receipt) > timeout)
            .map(|e| e.id)
            .collect()
    }

    pub fn get(&self, id: PlayerId) -> Option<&RemoteEntity> {
        self.entities.get(&id)
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RemoteEntity> {
        self.entities.values()
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.entities.keys().copied().collect()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
