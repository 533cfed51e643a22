//! Authority
//!
//! The single arbitrating replica. It re-validates every intent before
//! committing it, simulates movement and object physics, runs the match
//! flow, and turns what changed into broadcasts.
//!
//! ## Tick order
//!
//! 1. Intents received this tick (`handle`), in arrival order
//! 2. Match flow (countdown, goal detection)
//! 3. Stun/effect timers
//! 4. Character movement and landings
//! 5. Object physics (pull travel, flight, hits)
//! 6. Events → broadcasts, then throw-state syncs, then replication deltas

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::config::GameConfig;
use crate::core::hash::StateHash;
use crate::core::vec3::Vec3;
use crate::game::animation::{SECTION_AIM_START, SECTION_DEFAULT};
use crate::game::character::CharacterSnapshot;
use crate::game::events::{GameEvent, GameEventData};
use crate::game::interactable::ObjectSnapshot;
use crate::game::match_flow::{GameMode, MatchNotice, PlayerKind};
use crate::game::state::{MatchPhase, NetRole, ObjectId, PlayerGameState, PlayerId, ThrowState};
use crate::game::target::resolve_at_location;
use crate::game::world::World;
use crate::network::protocol::{ClientMessage, Intent, ServerMessage};

/// Who a broadcast goes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recipient {
    /// Every connected client
    All,
    /// One client
    Only(PlayerId),
}

/// A message leaving the authority.
#[derive(Clone, Debug, PartialEq)]
pub struct Outgoing {
    /// Destination
    pub to: Recipient,
    /// Payload
    pub message: ServerMessage,
}

impl Outgoing {
    /// Route by the message's own addressee, or to everyone.
    pub fn routed(message: ServerMessage) -> Self {
        let to = message.recipient().map(Recipient::Only).unwrap_or(Recipient::All);
        Self { to, message }
    }
}

/// Server-side arbiter.
pub struct Authority {
    /// Authoritative world
    pub world: World,
    mode: GameMode,
    /// Highest intent sequence processed per player
    acked: BTreeMap<PlayerId, u32>,
    /// Players whose throw state must be re-sent
    dirty: BTreeSet<PlayerId>,
    outbox: Vec<Outgoing>,
    events: Vec<GameEvent>,
    sent_characters: BTreeMap<PlayerId, CharacterSnapshot>,
    sent_objects: BTreeMap<ObjectId, ObjectSnapshot>,
}

impl Authority {
    /// Create the authority with the configured level loaded.
    pub fn new(config: GameConfig) -> Self {
        let countdown_ticks = config.seconds_to_ticks(config.match_flow.countdown_duration);
        let mode = GameMode::new(config.match_flow.clone(), countdown_ticks);
        Self {
            world: World::with_level(config),
            mode,
            acked: BTreeMap::new(),
            dirty: BTreeSet::new(),
            outbox: Vec::new(),
            events: Vec::new(),
            sent_characters: BTreeMap::new(),
            sent_objects: BTreeMap::new(),
        }
    }

    /// Match controller.
    pub fn game_mode(&self) -> &GameMode {
        &self.mode
    }

    /// Current tick.
    pub fn tick(&self) -> u32 {
        self.world.tick
    }

    /// Hash of the authoritative replicated state.
    pub fn state_hash(&self) -> StateHash {
        self.world.compute_hash()
    }

    /// Highest intent sequence processed for `player`.
    pub fn acked(&self, player: &PlayerId) -> u32 {
        self.acked.get(player).copied().unwrap_or(0)
    }

    /// Take pending broadcasts.
    pub fn take_outgoing(&mut self) -> Vec<Outgoing> {
        std::mem::take(&mut self.outbox)
    }

    /// Take the event log since the last call.
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    fn send(&mut self, message: ServerMessage) {
        self.outbox.push(Outgoing::routed(message));
    }

    // =========================================================================
    // Roster
    // =========================================================================

    /// Messages that bring a late joiner up to date.
    pub fn snapshot_messages(&self) -> Vec<ServerMessage> {
        let mut messages = vec![ServerMessage::MatchPhase(self.world.phase)];
        for (id, c) in &self.world.characters {
            messages.push(ServerMessage::SpawnCharacter { player: *id, position: c.position });
            messages.push(ServerMessage::CharacterSync(c.snapshot()));
            messages.push(ServerMessage::PlayerStatus { player: *id, status: c.status });
            messages.push(ServerMessage::ThrowStateSync {
                player: *id,
                state: c.throw.state(),
                held: c.throw.held(),
                ack_seq: self.acked(id),
            });
        }
        for object in self.world.interactables.values() {
            messages.push(ServerMessage::ObjectSync(object.snapshot()));
        }
        messages
    }

    /// Add a player and restart it, which may start the match.
    pub fn join(&mut self, player: PlayerId, kind: PlayerKind, spectator: bool) -> bool {
        let Some(index) = self.mode.add_player(player, kind, spectator) else {
            return false;
        };
        info!(player = %player, ?kind, spectator, "player joined");
        if !spectator {
            let position = self.world.spawn_point(index);
            self.world.spawn_character(player, NetRole::Authority, position);
            self.send(ServerMessage::SpawnCharacter { player, position });
            let notices = self.mode.restart_player(&mut self.world, player);
            self.broadcast_notices(notices);
        } else {
            let notices = self.mode.attempt_start_game(&mut self.world);
            self.broadcast_notices(notices);
        }
        true
    }

    /// Add a server-driven agent.
    pub fn add_ai(&mut self, player: PlayerId) -> bool {
        self.join(player, PlayerKind::Ai, false)
    }

    /// Remove a player, dropping whatever it held.
    pub fn leave(&mut self, player: PlayerId) -> bool {
        if self.mode.remove_player(&player).is_none() {
            return false;
        }
        info!(player = %player, "player left");
        self.world.despawn_character(player);
        self.acked.remove(&player);
        self.sent_characters.remove(&player);
        self.send(ServerMessage::DespawnCharacter { player });
        self.flush_events();
        true
    }

    // =========================================================================
    // Intents
    // =========================================================================

    /// Validate and apply one intent.
    pub fn handle(&mut self, message: ClientMessage) {
        let ClientMessage { seq, player, intent } = message;
        if self.world.character(&player).is_none() {
            warn!(player = %player, "intent from unknown player dropped");
            return;
        }
        let acked = self.acked.entry(player).or_insert(0);
        *acked = (*acked).max(seq);
        if intent.affects_throw() {
            // Answer even a rejected request so the owner can reconcile
            self.dirty.insert(player);
        }

        match intent {
            Intent::PullRequest(true) => {
                if let Some(c) = self.world.character_mut(&player) {
                    let stunned = c.is_stunned();
                    c.throw.request_pull(stunned);
                }
            }
            Intent::PullRequest(false) => {
                let outcome = self.world.character_mut(&player).and_then(|c| c.throw.stop_pull());
                if let Some(outcome) = outcome {
                    self.world.apply_reset(player, outcome);
                }
            }
            Intent::PullObject(object) => {
                self.claim(player, object);
            }
            Intent::ToggleAim(on) => {
                if let Some(c) = self.world.character_mut(&player) {
                    if on {
                        c.throw.request_aim();
                    } else {
                        c.throw.stop_aim();
                    }
                }
            }
            Intent::RequestThrow => self.start_throw(player),
            Intent::BeginThrow => self.launch(player),
            Intent::FinishThrow => self.finish_throw(player),
            Intent::UseObject => self.use_object(player),
            Intent::DropObject => {
                self.world.drop_held(player);
            }
            Intent::SprintStart => {
                if let Some(c) = self.world.character_mut(&player) {
                    c.request_sprint_start();
                }
            }
            Intent::SprintEnd => {
                if let Some(c) = self.world.character_mut(&player) {
                    c.request_sprint_end();
                }
            }
            Intent::Movement { direction, facing, view_forward } => {
                let can_play = self.can_play(&player);
                if let Some(c) = self.world.character_mut(&player) {
                    let direction = direction.horizontal();
                    c.move_input = if !can_play || !direction.is_finite() {
                        Vec3::ZERO
                    } else if direction.length_squared() > 1.0 {
                        direction.normalize()
                    } else {
                        direction
                    };
                    let facing = facing.horizontal().normalize();
                    if facing != Vec3::ZERO {
                        c.facing = facing;
                    }
                    let view = view_forward.normalize();
                    if view != Vec3::ZERO {
                        c.view_forward = view;
                    }
                }
            }
            Intent::Jump => {
                if self.can_play(&player) {
                    if let Some(c) = self.world.character_mut(&player) {
                        c.jump();
                    }
                }
            }
            Intent::RestartLevel => self.restart_level(player),
        }

        self.flush_events();
    }

    fn can_play(&self, player: &PlayerId) -> bool {
        self.world.phase == MatchPhase::Playing
            && self
                .world
                .character(player)
                .map(|c| c.status.game_state == PlayerGameState::Playing)
                .unwrap_or(false)
    }

    /// Claim `object` for `player`. On any failure the puller goes back to `None`.
    pub fn claim(&mut self, player: PlayerId, object: ObjectId) -> bool {
        let throwing = self.world.config().throwing.clone();
        let Some(c) = self.world.character(&player) else {
            return false;
        };
        let origin = c.trace_origin();
        let allowed = !c.is_stunned()
            && c.throw.state() == ThrowState::RequestingPull
            && c.speed_squared() < throwing.pull_speed_sq_threshold;

        let in_range = self
            .world
            .interactable(&object)
            .map(|o| o.position.distance(origin) <= throwing.pull_range)
            .unwrap_or(false);

        let claimed = allowed
            && in_range
            && self
                .world
                .interactable_mut(&object)
                .map(|o| o.pull(player))
                .unwrap_or(false);

        if claimed {
            if let Some(c) = self.world.character_mut(&player) {
                c.throw.begin_pulling(object);
            }
            debug!(player = %player, %object, "pull claimed");
            self.world.push_event(GameEventData::ObjectClaimed { player_id: player, object });
        } else {
            if let Some(outcome) = self.world.character_mut(&player).map(|c| c.throw.reset()) {
                self.world.apply_reset(player, outcome);
            }
            debug!(player = %player, %object, "pull rejected");
            self.world.push_event(GameEventData::PullRejected { player_id: player, object });
        }
        self.dirty.insert(player);
        claimed
    }

    fn start_throw(&mut self, player: PlayerId) {
        let Some(c) = self.world.character_mut(&player) else {
            return;
        };
        let section = if c.throw.is_aiming() { SECTION_AIM_START } else { SECTION_DEFAULT };
        if !c.throw.enter_throwing() {
            return;
        }
        debug!(player = %player, section, "throw started");
        self.world.push_event(GameEventData::ThrowStarted {
            player_id: player,
            section: section.to_string(),
        });
    }

    /// Launch the held object along the thrower's facing. Only a
    /// `Throwing` character launches, so each throw launches once.
    fn launch(&mut self, player: PlayerId) {
        let throw_speed = self.world.config().throwing.throw_speed;
        let display = self.world.config().trace.display_throw_velocity;
        let Some(c) = self.world.character_mut(&player) else {
            return;
        };
        if c.throw.state() != ThrowState::Throwing {
            debug!(player = %player, "launch without throw ignored");
            return;
        }
        let velocity = c.facing * throw_speed;
        let Some(object) = c.throw.release() else {
            return;
        };

        let launched = self
            .world
            .interactable_mut(&object)
            .map(|o| o.launch(player, velocity))
            .unwrap_or(false);
        if !launched {
            warn!(player = %player, %object, "held object could not be launched");
            return;
        }
        if display {
            info!(player = %player, %object, "throw velocity {}", velocity);
        }
        self.world.push_event(GameEventData::ObjectLaunched { player_id: player, object, velocity });
    }

    fn finish_throw(&mut self, player: PlayerId) {
        let still_throwing = self
            .world
            .character(&player)
            .map(|c| c.throw.state() == ThrowState::Throwing)
            .unwrap_or(false);
        if still_throwing {
            // Release marker never fired
            self.world.drop_held(player);
        }
        for object in self.world.interactables.values_mut() {
            object.restore_collision(player);
        }
        self.world.push_event(GameEventData::ThrowFinished { player_id: player });
    }

    fn use_object(&mut self, player: PlayerId) {
        let Some(object) = self.world.character_mut(&player).and_then(|c| c.throw.consume_held()) else {
            return;
        };
        let effect = match self.world.interactable_mut(&object) {
            Some(o) => {
                let effect = o.effect;
                o.destroy();
                effect
            }
            None => return,
        };
        self.world.push_event(GameEventData::ObjectUsed { player_id: player, object, effect });
        self.world.apply_effect(player, effect, true);
    }

    fn restart_level(&mut self, player: PlayerId) {
        let finished = self
            .world
            .character(&player)
            .map(|c| c.status.game_state == PlayerGameState::Finished)
            .unwrap_or(false);
        if !finished && self.world.phase != MatchPhase::Complete {
            debug!(player = %player, "restart ignored while still racing");
            return;
        }
        let notices = self.mode.restart_game(&mut self.world);
        self.broadcast_notices(notices);
    }

    /// Stun a character from outside the simulation (scripted hazards).
    pub fn stun(&mut self, player: PlayerId, ratio: f32) -> bool {
        let begun = self.world.stun_character(player, ratio).is_some();
        self.flush_events();
        begun
    }

    /// AI pull: probe straight at `location` and claim what is hit.
    /// Leaves the agent in `None` unless it ends up pulling.
    pub fn ai_pull_at(&mut self, player: PlayerId, location: Vec3) -> bool {
        let threshold = self.world.config().throwing.pull_speed_sq_threshold;
        let input = match self.world.character_mut(&player) {
            Some(c) => {
                let stunned = c.is_stunned();
                if !c.throw.request_pull(stunned) {
                    return false;
                }
                c.resolver_input()
            }
            None => return false,
        };

        let update = resolve_at_location(&input, location, threshold, &self.world);
        let pulled = match update.auto_pull {
            Some(object) => self.claim(player, object),
            None => {
                if let Some(outcome) = self.world.character_mut(&player).map(|c| c.throw.reset()) {
                    self.world.apply_reset(player, outcome);
                }
                false
            }
        };
        self.dirty.insert(player);
        self.flush_events();
        pulled
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advance one tick after this tick's intents were handled.
    pub fn step(&mut self, dt: f32) {
        let notices = self.mode.update(&mut self.world);
        self.broadcast_notices(notices);

        self.world.update_timers(dt);

        for (player, vertical_speed) in self.world.step_characters(dt) {
            self.world.notify_landed(player, vertical_speed);
        }

        self.world.step_objects(dt);

        self.flush_events();
        self.flush_throw_syncs();
        self.flush_replication();
        self.world.tick += 1;
    }

    // =========================================================================
    // Broadcasting
    // =========================================================================

    /// Turn recorded world events into broadcasts, in order.
    fn flush_events(&mut self) {
        for event in self.world.take_events() {
            match &event.data {
                GameEventData::StunBegan { player_id, ratio, duration } => {
                    info!(player = %player_id, ratio, duration, "stunned");
                    self.send(ServerMessage::Stunned { player: *player_id, ratio: *ratio });
                    self.dirty.insert(*player_id);
                }
                GameEventData::EffectApplied { player_id, kind, is_buff } => {
                    self.send(ServerMessage::EffectApplied {
                        player: *player_id,
                        kind: *kind,
                        is_buff: *is_buff,
                    });
                }
                GameEventData::ForceFeedback {
                    player_id,
                    intensity,
                    duration,
                    affect_large,
                    affect_small,
                } => {
                    self.send(ServerMessage::ForceFeedback {
                        player: *player_id,
                        intensity: *intensity,
                        duration: *duration,
                        affect_large: *affect_large,
                        affect_small: *affect_small,
                    });
                }
                GameEventData::ObjectAttached { player_id, object } => {
                    debug!(player = %player_id, %object, "attached");
                    self.send(ServerMessage::ThrowableAttached { player: *player_id, object: *object });
                    self.dirty.insert(*player_id);
                }
                GameEventData::ThrowStarted { player_id, section } => {
                    self.send(ServerMessage::ThrowStarted {
                        player: *player_id,
                        section: section.clone(),
                    });
                }
                GameEventData::ObjectLaunched { player_id, object, velocity } => {
                    info!(player = %player_id, %object, "launched");
                    self.send(ServerMessage::ObjectLaunched {
                        player: *player_id,
                        object: *object,
                        velocity: *velocity,
                    });
                }
                GameEventData::ObjectDropped { player_id, .. }
                | GameEventData::ObjectUsed { player_id, .. }
                | GameEventData::ObjectClaimed { player_id, .. }
                | GameEventData::PullRejected { player_id, .. } => {
                    self.dirty.insert(*player_id);
                }
                _ => {}
            }
            self.events.push(event);
        }
    }

    fn broadcast_notices(&mut self, notices: Vec<MatchNotice>) {
        for notice in notices {
            match notice {
                MatchNotice::PhaseChanged { old, new } => {
                    self.events.push(GameEvent::phase_changed(self.world.tick, old, new));
                    self.send(ServerMessage::MatchPhase(new));
                }
                MatchNotice::DisplayCountdown { player, duration } => {
                    self.send(ServerMessage::DisplayCountdown { player, duration });
                }
                MatchNotice::StatusChanged { player, status } => {
                    self.send(ServerMessage::PlayerStatus { player, status });
                }
                MatchNotice::RestartGame { player } => {
                    self.send(ServerMessage::RestartGame { player });
                    let everyone: Vec<PlayerId> = self.world.characters.keys().copied().collect();
                    self.dirty.extend(everyone);
                }
                MatchNotice::ReachedEnd { player, winner } => {
                    self.events.push(GameEvent::new(
                        self.world.tick,
                        GameEventData::ReachedEnd { player_id: player, winner },
                    ));
                    self.send(ServerMessage::ReachedEnd { player, winner });
                    self.send(ServerMessage::PlayCelebrate { player });
                }
                MatchNotice::Respawned { .. } => {}
                MatchNotice::AiRemoved { player } => {
                    self.sent_characters.remove(&player);
                    self.acked.remove(&player);
                    self.send(ServerMessage::DespawnCharacter { player });
                }
            }
        }
        self.flush_events();
    }

    fn flush_throw_syncs(&mut self) {
        for player in std::mem::take(&mut self.dirty) {
            let Some(c) = self.world.character(&player) else {
                continue;
            };
            let message = ServerMessage::ThrowStateSync {
                player,
                state: c.throw.state(),
                held: c.throw.held(),
                ack_seq: self.acked(&player),
            };
            self.send(message);
        }
    }

    /// Send character and object snapshots that changed since last sent.
    fn flush_replication(&mut self) {
        let characters: Vec<CharacterSnapshot> = self
            .world
            .characters
            .values()
            .map(|c| c.snapshot())
            .filter(|s| self.sent_characters.get(&s.player) != Some(s))
            .collect();
        for snapshot in characters {
            self.sent_characters.insert(snapshot.player, snapshot);
            self.send(ServerMessage::CharacterSync(snapshot));
        }

        let objects: Vec<ObjectSnapshot> = self
            .world
            .interactables
            .values()
            .map(|o| o.snapshot())
            .filter(|s| self.sent_objects.get(&s.object) != Some(s))
            .collect();
        for snapshot in objects {
            self.sent_objects.insert(snapshot.object, snapshot);
            self.send(ServerMessage::ObjectSync(snapshot));
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
