//! Simulated World
//!
//! One replica of the level: characters, interactables and obstacles.
//! The authority steps physics here; observers mirror into their own copy.
//! Uses BTreeMap so every replica iterates in the same order.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::config::{GameConfig, LevelConfig};
use crate::core::hash::{compute_state_hash, StateHash};
use crate::core::vec3::Vec3;
use crate::game::character::{Character, StunBegun};
use crate::game::events::{GameEvent, GameEventData};
use crate::game::interactable::{Interactable, InteractableState};
use crate::game::state::{EffectKind, MatchPhase, NetRole, ObjectId, PlayerId};
use crate::game::stun::{fall_impact, FallImpact, FeedbackProfile};
use crate::game::target::{HitActor, HitResult, SpatialQuery, TargetUpdate};
use crate::game::throw::ResetOutcome;

/// Static sphere blocking probes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Obstacle {
    /// Index in the level
    pub id: u32,
    /// Centre
    pub center: Vec3,
    /// Radius
    pub radius: f32,
}

/// Physics outcomes the authority replicates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ObjectNotice {
    /// Pulled object reached the puller's hand
    Attached { player: PlayerId, object: ObjectId },
    /// Thrown object struck a character
    HitCharacter { object: ObjectId, victim: PlayerId },
    /// Thrown object came to rest
    Landed { object: ObjectId },
}

/// One replica of the level.
#[derive(Clone, Debug)]
pub struct World {
    /// Current tick
    pub tick: u32,
    /// Match phase
    pub phase: MatchPhase,
    /// Characters by player
    pub characters: BTreeMap<PlayerId, Character>,
    /// Throwables by handle
    pub interactables: BTreeMap<ObjectId, Interactable>,
    /// Static geometry
    pub obstacles: Vec<Obstacle>,
    pending_events: Vec<GameEvent>,
    next_object_id: u32,
    config: GameConfig,
}

impl World {
    /// Empty world.
    pub fn new(config: GameConfig) -> Self {
        Self {
            tick: 0,
            phase: MatchPhase::Waiting,
            characters: BTreeMap::new(),
            interactables: BTreeMap::new(),
            obstacles: Vec::new(),
            pending_events: Vec::new(),
            next_object_id: 1,
            config,
        }
    }

    /// World with the configured level loaded.
    pub fn with_level(config: GameConfig) -> Self {
        let level = config.level.clone();
        let mut world = Self::new(config);
        world.load_level(&level);
        world
    }

    /// Spawn the level's throwables and obstacles. Handles are assigned in
    /// layout order, so every replica agrees on them.
    pub fn load_level(&mut self, level: &LevelConfig) {
        for spawn in &level.throwables {
            self.spawn_interactable(spawn.position, spawn.effect);
        }
        for (i, obstacle) in level.obstacles.iter().enumerate() {
            self.obstacles.push(Obstacle {
                id: i as u32,
                center: obstacle.center,
                radius: obstacle.radius,
            });
        }
    }

    /// Configuration in force.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Spawn point for the n-th player.
    pub fn spawn_point(&self, index: usize) -> Vec3 {
        let points = &self.config.level.spawn_points;
        points.get(index % points.len().max(1)).copied().unwrap_or(Vec3::ZERO)
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Spawn (or replace) a character.
    pub fn spawn_character(&mut self, id: PlayerId, role: NetRole, position: Vec3) -> &mut Character {
        let character = Character::new(id, role, position, &self.config.character);
        match self.characters.entry(id) {
            Entry::Occupied(mut slot) => {
                slot.insert(character);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(character),
        }
    }

    /// Remove a character, dropping whatever it held.
    pub fn despawn_character(&mut self, id: PlayerId) -> Option<Character> {
        self.drop_held(id);
        self.characters.remove(&id)
    }

    /// Spawn a throwable and return its handle.
    pub fn spawn_interactable(&mut self, position: Vec3, effect: EffectKind) -> ObjectId {
        let id = ObjectId(self.next_object_id);
        self.next_object_id += 1;
        let radius = self.config.throwing.object_radius;
        self.interactables.insert(id, Interactable::new(id, position, radius, effect));
        id
    }

    /// Get a character.
    pub fn character(&self, id: &PlayerId) -> Option<&Character> {
        self.characters.get(id)
    }

    /// Get a character mutably.
    pub fn character_mut(&mut self, id: &PlayerId) -> Option<&mut Character> {
        self.characters.get_mut(id)
    }

    /// Get an interactable.
    pub fn interactable(&self, id: &ObjectId) -> Option<&Interactable> {
        self.interactables.get(id)
    }

    /// Get an interactable mutably.
    pub fn interactable_mut(&mut self, id: &ObjectId) -> Option<&mut Interactable> {
        self.interactables.get_mut(id)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Record an event at the current tick.
    pub fn push_event(&mut self, data: GameEventData) {
        self.pending_events.push(GameEvent::new(self.tick, data));
    }

    /// Take all events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    // =========================================================================
    // Interaction side effects
    // =========================================================================

    /// Set an object's local highlight, recording a change.
    pub fn set_highlight(&mut self, player: PlayerId, object: ObjectId, on: bool) {
        let changed = self
            .interactables
            .get_mut(&object)
            .map(|o| o.toggle_highlight(on))
            .unwrap_or(false);
        if changed {
            self.push_event(GameEventData::TargetHighlighted {
                player_id: player,
                object,
                highlighted: on,
            });
        }
    }

    /// Apply a resolver update to `player`. Returns the object to pull.
    pub fn apply_target_update(&mut self, player: PlayerId, update: &TargetUpdate) -> Option<ObjectId> {
        if let Some(object) = update.unhighlight {
            self.set_highlight(player, object, false);
        }
        if let Some(object) = update.highlight {
            self.set_highlight(player, object, true);
        }
        if let Some(character) = self.characters.get_mut(&player) {
            character.throw.set_target(update.target);
        }
        update.auto_pull
    }

    /// Release what a throw reset let go of.
    pub fn apply_reset(&mut self, player: PlayerId, outcome: ResetOutcome) {
        if let Some(object) = outcome.unhighlight {
            self.set_highlight(player, object, false);
        }
        if let Some(object) = outcome.dropped {
            let dropped = self
                .interactables
                .get_mut(&object)
                .map(|o| o.holder() == Some(player) && o.drop_object())
                .unwrap_or(false);
            if dropped {
                self.push_event(GameEventData::ObjectDropped { player_id: player, object });
            }
        }
    }

    /// Reset `player`'s throw state, dropping what it held.
    pub fn drop_held(&mut self, player: PlayerId) -> bool {
        let Some(outcome) = self.characters.get_mut(&player).map(|c| c.throw.reset()) else {
            return false;
        };
        let had_object = outcome.dropped.is_some();
        self.apply_reset(player, outcome);
        had_object
    }

    /// Stun a character. No stacking; a committed throw survives.
    pub fn stun_character(&mut self, player: PlayerId, ratio: f32) -> Option<StunBegun> {
        let begun = self.characters.get_mut(&player)?.begin_stun(ratio)?;
        if let Some(outcome) = begun.reset {
            self.apply_reset(player, outcome);
        }
        self.push_event(GameEventData::StunBegan {
            player_id: player,
            ratio,
            duration: begun.duration,
        });
        Some(begun)
    }

    /// React to a landing: rumble, and stun on a hard impact.
    pub fn notify_landed(&mut self, player: PlayerId, vertical_speed: f32) -> Option<FallImpact> {
        let impact = fall_impact(vertical_speed, &self.config.character)?;
        let large = impact.profile == FeedbackProfile::Large;
        self.push_event(GameEventData::ForceFeedback {
            player_id: player,
            intensity: impact.ratio,
            duration: self.config.character.force_feedback_duration,
            affect_large: large,
            affect_small: !large,
        });
        if impact.stuns() {
            self.stun_character(player, impact.ratio);
        }
        Some(impact)
    }

    // =========================================================================
    // Stepping
    // =========================================================================

    /// Advance stun and effect timers of every character.
    pub fn update_timers(&mut self, dt: f32) {
        let mut ended = Vec::new();
        for (id, character) in self.characters.iter_mut() {
            if character.update_stun(dt) {
                ended.push(GameEventData::StunEnded { player_id: *id });
            }
            if let Some((kind, is_buff)) = character.update_effect(dt) {
                ended.push(GameEventData::EffectEnded { player_id: *id, kind, is_buff });
            }
        }
        for data in ended {
            self.push_event(data);
        }
    }

    /// Integrate character movement. Returns landings as (player, vertical speed).
    pub fn step_characters(&mut self, dt: f32) -> Vec<(PlayerId, f32)> {
        self.characters
            .iter_mut()
            .filter_map(|(id, c)| c.integrate(dt).map(|speed| (*id, speed)))
            .collect()
    }

    /// Step interactable physics: pull travel, carrying, flight and falls.
    pub fn step_objects(&mut self, dt: f32) -> Vec<ObjectNotice> {
        let throwing = &self.config.throwing;
        let gravity = self.config.character.gravity;
        let capsule = self.config.character.capsule_radius;
        let characters = &self.characters;
        let mut notices = Vec::new();

        for object in self.interactables.values_mut() {
            if object.destroyed {
                continue;
            }
            match object.state {
                InteractableState::Pulled { by } => {
                    let Some(holder) = characters.get(&by) else {
                        object.drop_object();
                        continue;
                    };
                    let hand = holder.hold_point(throwing.hold_height);
                    object.position = object.position.move_towards(hand, throwing.pull_travel_speed * dt);
                    if object.position == hand && object.attach(by) {
                        notices.push(ObjectNotice::Attached { player: by, object: object.id });
                    }
                }
                InteractableState::Attached { by } => match characters.get(&by) {
                    Some(holder) => object.position = holder.hold_point(throwing.hold_height),
                    None => {
                        object.drop_object();
                    }
                },
                InteractableState::Thrown { .. } => {
                    object.velocity.z -= gravity * dt;
                    object.position += object.velocity * dt;
                    object.flight_time += dt;

                    let victim = characters.values().find(|c| {
                        Some(c.id) != object.ignored_actor
                            && c.trace_origin().distance(object.position) <= capsule + object.radius
                    });
                    if let Some(victim) = victim {
                        notices.push(ObjectNotice::HitCharacter { object: object.id, victim: victim.id });
                        // Stops dead and falls from here
                        object.land();
                        continue;
                    }

                    if object.position.z <= object.radius || object.flight_time >= throwing.max_flight_time {
                        object.position.z = object.position.z.max(object.radius);
                        object.land();
                        notices.push(ObjectNotice::Landed { object: object.id });
                    }
                }
                InteractableState::Idle => {
                    if object.position.z > object.radius {
                        object.velocity.z -= gravity * dt;
                        object.position += object.velocity * dt;
                        if object.position.z <= object.radius {
                            object.position.z = object.radius;
                            object.velocity = Vec3::ZERO;
                        }
                    }
                }
            }
        }

        for notice in &notices {
            match *notice {
                ObjectNotice::Attached { player, object } => {
                    if let Some(c) = self.characters.get_mut(&player) {
                        c.throw.attach(object);
                    }
                    self.push_event(GameEventData::ObjectAttached { player_id: player, object });
                }
                ObjectNotice::HitCharacter { object, victim } => {
                    self.push_event(GameEventData::ObjectHitCharacter { object, victim_id: victim });
                    self.stun_character(victim, 1.0);
                    let effect = self.interactables.get(&object).map(|o| o.effect).unwrap_or_default();
                    if effect != EffectKind::None {
                        self.apply_effect(victim, effect, false);
                    }
                }
                ObjectNotice::Landed { object } => {
                    self.push_event(GameEventData::ObjectLanded { object });
                }
            }
        }

        notices
    }

    /// Apply a buff/debuff, recording it when it takes.
    pub fn apply_effect(&mut self, player: PlayerId, kind: EffectKind, is_buff: bool) -> bool {
        let applied = self
            .characters
            .get_mut(&player)
            .map(|c| c.apply_effect(kind, is_buff))
            .unwrap_or(false);
        if applied {
            self.push_event(GameEventData::EffectApplied { player_id: player, kind, is_buff });
        }
        applied
    }

    /// Put every object back and empty every hand.
    pub fn reset_level(&mut self) {
        for object in self.interactables.values_mut() {
            object.reset();
        }
        for character in self.characters.values_mut() {
            character.throw.reset();
        }
    }

    // =========================================================================
    // Hashing
    // =========================================================================

    /// Hash of the logical replicated state.
    pub fn compute_hash(&self) -> StateHash {
        compute_state_hash(self.phase.code(), |hasher| {
            for (id, c) in &self.characters {
                hasher.update_uuid(&id.0);
                hasher.update_u8(c.throw.state() as u8);
                hasher.update_opt_u32(c.throw.held().map(|o| o.0));
                hasher.update_bool(c.is_stunned());
                hasher.update_u8(c.status.game_state as u8);
                hasher.update_bool(c.status.is_winner);
            }
            for (id, o) in &self.interactables {
                hasher.update_u32(id.0);
                hasher.update_u8(o.state.code());
                hasher.update_uuid(&o.holder().unwrap_or_default().0);
                hasher.update_bool(o.destroyed);
            }
        })
    }
}

// =============================================================================
// SPATIAL QUERY
// =============================================================================

impl SpatialQuery for World {
    fn cast_shape(&self, origin: Vec3, end: Vec3, radius: f32, ignore: Option<PlayerId>) -> HitResult {
        let capsule = self.config.character.capsule_radius;

        let characters = self
            .characters
            .values()
            .filter(|c| Some(c.id) != ignore)
            .map(|c| (c.trace_origin(), capsule, HitActor::Character(c.id)));
        let objects = self
            .interactables
            .values()
            .filter(|o| !o.destroyed)
            .map(|o| (o.position, o.radius, HitActor::Interactable(o.id)));
        let obstacles = self
            .obstacles
            .iter()
            .map(|o| (o.center, o.radius, HitActor::Obstacle(o.id)));

        let mut best: Option<(f32, HitResult)> = None;
        for (center, r, actor) in characters.chain(objects).chain(obstacles) {
            let (closest, t) = center.closest_on_segment(origin, end);
            if closest.distance(center) > r + radius {
                continue;
            }
            if best.as_ref().map(|(bt, _)| t < *bt).unwrap_or(true) {
                best = Some((t, HitResult { blocking: true, actor: Some(actor), point: closest }));
            }
        }

        best.map(|(_, hit)| hit).unwrap_or_else(|| HitResult::miss(end))
    }

    fn is_idle_interactable(&self, object: ObjectId) -> bool {
        self.interactables.get(&object).map(|o| o.is_idle()).unwrap_or(false)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::ThrowState;

    fn world() -> World {
        let mut config = GameConfig::default();
        config.level.throwables.clear();
        config.level.obstacles.clear();
        World::with_level(config)
    }

    fn holding(world: &mut World, player: PlayerId, object: ObjectId) {
        let c = world.character_mut(&player).unwrap();
        c.throw.request_pull(false);
        c.throw.begin_pulling(object);
        world.interactable_mut(&object).unwrap().pull(player);
    }

    #[test]
    fn test_sphere_cast_picks_nearest() {
        let mut w = world();
        let near = w.spawn_interactable(Vec3::new(300.0, 0.0, 40.0), EffectKind::None);
        w.spawn_interactable(Vec3::new(600.0, 0.0, 40.0), EffectKind::None);

        let hit = w.cast_shape(Vec3::new(0.0, 0.0, 40.0), Vec3::new(1000.0, 0.0, 40.0), 70.0, None);
        assert_eq!(hit.interactable(), Some(near));
    }

    #[test]
    fn test_line_cast_needs_direct_hit() {
        let mut w = world();
        w.spawn_interactable(Vec3::new(300.0, 90.0, 40.0), EffectKind::None);

        let origin = Vec3::new(0.0, 0.0, 40.0);
        let end = Vec3::new(1000.0, 0.0, 40.0);
        assert!(!w.cast_shape(origin, end, 0.0, None).blocking);
        assert!(w.cast_shape(origin, end, 70.0, None).blocking);
    }

    #[test]
    fn test_cast_skips_ignored_character() {
        let mut w = world();
        let me = PlayerId::new([1; 16]);
        w.spawn_character(me, NetRole::Authority, Vec3::ZERO);
        let hit = w.cast_shape(Vec3::new(-300.0, 0.0, 40.0), Vec3::new(1000.0, 0.0, 40.0), 70.0, Some(me));
        assert!(!hit.blocking);

        let hit = w.cast_shape(Vec3::new(-300.0, 0.0, 40.0), Vec3::new(1000.0, 0.0, 40.0), 70.0, None);
        assert_eq!(hit.actor, Some(HitActor::Character(me)));
    }

    #[test]
    fn test_pulled_object_travels_and_attaches() {
        let mut w = world();
        let me = PlayerId::new([1; 16]);
        w.spawn_character(me, NetRole::Authority, Vec3::ZERO);
        let obj = w.spawn_interactable(Vec3::new(300.0, 0.0, 40.0), EffectKind::None);
        holding(&mut w, me, obj);

        let mut attached = false;
        for _ in 0..60 {
            if w.step_objects(1.0 / 60.0).contains(&ObjectNotice::Attached { player: me, object: obj }) {
                attached = true;
                break;
            }
        }

        assert!(attached);
        assert_eq!(w.character(&me).unwrap().throw.state(), ThrowState::Attached);
        assert_eq!(w.interactable(&obj).unwrap().position, Vec3::new(0.0, 0.0, 100.0));
    }

    #[test]
    fn test_thrown_object_stuns_and_debuffs_victim() {
        let mut w = world();
        let thrower = PlayerId::new([1; 16]);
        let victim = PlayerId::new([2; 16]);
        w.spawn_character(thrower, NetRole::Authority, Vec3::ZERO);
        w.spawn_character(victim, NetRole::Authority, Vec3::new(400.0, 0.0, 0.0));
        let obj = w.spawn_interactable(Vec3::new(0.0, 0.0, 100.0), EffectKind::Speed);
        {
            let o = w.interactable_mut(&obj).unwrap();
            o.pull(thrower);
            o.attach(thrower);
            o.launch(thrower, Vec3::new(2000.0, 0.0, 0.0));
        }

        let mut hit = false;
        for _ in 0..60 {
            let notices = w.step_objects(1.0 / 60.0);
            if notices.contains(&ObjectNotice::HitCharacter { object: obj, victim }) {
                hit = true;
                break;
            }
        }

        assert!(hit);
        let v = w.character(&victim).unwrap();
        assert!(v.is_stunned());
        assert_eq!(v.stun.duration, 3.0);
        assert!(v.effect.active && !v.effect.is_buff);
        assert!(!w.character(&thrower).unwrap().is_stunned());
    }

    #[test]
    fn test_stun_drops_held_object() {
        let mut w = world();
        let me = PlayerId::new([1; 16]);
        w.spawn_character(me, NetRole::Authority, Vec3::ZERO);
        let obj = w.spawn_interactable(Vec3::new(300.0, 0.0, 40.0), EffectKind::None);
        holding(&mut w, me, obj);

        assert!(w.stun_character(me, 0.0).is_some());
        assert!(w.stun_character(me, 1.0).is_none());
        assert!(w.interactable(&obj).unwrap().is_idle());
        assert_eq!(w.character(&me).unwrap().throw.held(), None);

        let events = w.take_events();
        assert!(events.iter().any(|e| matches!(e.data, GameEventData::ObjectDropped { .. })));
    }

    #[test]
    fn test_hard_landing_stuns_with_large_feedback() {
        let mut w = world();
        let me = PlayerId::new([1; 16]);
        w.spawn_character(me, NetRole::Authority, Vec3::new(0.0, 0.0, 1500.0));

        let mut landing = None;
        for _ in 0..600 {
            if let Some((_, speed)) = w.step_characters(1.0 / 60.0).into_iter().next() {
                landing = Some(speed);
                break;
            }
        }

        let impact = w.notify_landed(me, landing.unwrap()).unwrap();
        assert!(impact.stuns());
        assert!(w.character(&me).unwrap().is_stunned());
        let events = w.take_events();
        assert!(events.iter().any(|e| matches!(
            e.data,
            GameEventData::ForceFeedback { affect_large: true, affect_small: false, .. }
        )));
    }

    #[test]
    fn test_soft_landing_only_rumbles() {
        let mut w = world();
        let me = PlayerId::new([1; 16]);
        w.spawn_character(me, NetRole::Authority, Vec3::ZERO);

        assert!(w.notify_landed(me, 700.0).is_none());
        let impact = w.notify_landed(me, 1000.0).unwrap();
        assert!(!impact.stuns());
        assert!(!w.character(&me).unwrap().is_stunned());
    }

    #[test]
    fn test_reset_level_restores_objects() {
        let mut w = world();
        let me = PlayerId::new([1; 16]);
        w.spawn_character(me, NetRole::Authority, Vec3::ZERO);
        let obj = w.spawn_interactable(Vec3::new(300.0, 0.0, 40.0), EffectKind::None);
        holding(&mut w, me, obj);
        w.interactable_mut(&obj).unwrap().destroy();

        let before = w.compute_hash();
        w.reset_level();
        assert!(w.interactable(&obj).unwrap().is_idle());
        assert_eq!(w.character(&me).unwrap().throw.state(), ThrowState::None);
        assert_ne!(before, w.compute_hash());
    }
}
