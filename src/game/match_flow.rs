//! Match Flow
//!
//! Waiting → Countdown → Playing → Complete → (restart) → Waiting.
//!
//! The [`GameMode`] lives on the authority. It owns the roster and drives
//! the world's phase and each character's status, returning
//! [`MatchNotice`]s that the authority turns into broadcasts.

use std::collections::BTreeMap;

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::config::MatchConfig;
use crate::core::vec3::Vec3;
use crate::game::character::PlayerStatus;
use crate::game::state::{MatchPhase, MovementMode, PlayerGameState, PlayerId};
use crate::game::world::World;

/// Countdowns shorter than this start immediately.
const SMALL_DURATION: f32 = 1.0e-4;

/// Who controls a roster slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlayerKind {
    /// Connected client
    Human,
    /// Server-driven agent
    Ai,
}

/// A roster entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerSlot {
    /// Player
    pub id: PlayerId,
    /// Human or AI
    pub kind: PlayerKind,
    /// Watches without playing
    pub spectator: bool,
    /// Join order, picks the spawn point
    pub spawn_index: usize,
}

impl PlayerSlot {
    /// Counts toward the expected players and receives HUD calls.
    #[inline]
    pub fn is_active_human(&self) -> bool {
        self.kind == PlayerKind::Human && !self.spectator
    }
}

/// Something observers must be told about.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MatchNotice {
    /// Global phase changed
    PhaseChanged {
        /// Previous phase
        old: MatchPhase,
        /// Current phase
        new: MatchPhase,
    },
    /// Show the countdown on this player's screen
    DisplayCountdown {
        /// Player concerned
        player: PlayerId,
        /// Duration (seconds)
        duration: f32,
    },
    /// A player's status changed
    StatusChanged {
        /// Player concerned
        player: PlayerId,
        /// New status
        status: PlayerStatus,
    },
    /// Clear the results screen on this player's client
    RestartGame {
        /// Player concerned
        player: PlayerId,
    },
    /// Player reached the goal
    ReachedEnd {
        /// Player concerned
        player: PlayerId,
        /// First to finish
        winner: bool,
    },
    /// Player moved back to its spawn point
    Respawned {
        /// Player concerned
        player: PlayerId,
        /// Spawn position
        position: Vec3,
    },
    /// AI agent removed
    AiRemoved {
        /// Player concerned
        player: PlayerId,
    },
}

/// Authoritative match controller.
#[derive(Clone, Debug)]
pub struct GameMode {
    roster: BTreeMap<PlayerId, PlayerSlot>,
    config: MatchConfig,
    countdown_ticks: u32,
    /// Finish order of the current match
    results: Vec<PlayerId>,
    next_spawn: usize,
}

impl GameMode {
    /// Create a controller. `countdown_ticks` is the countdown at tick rate.
    pub fn new(config: MatchConfig, countdown_ticks: u32) -> Self {
        Self {
            roster: BTreeMap::new(),
            config,
            countdown_ticks,
            results: Vec::new(),
            next_spawn: 0,
        }
    }

    /// Finish order so far.
    pub fn results(&self) -> &[PlayerId] {
        &self.results
    }

    /// Non-spectating humans.
    pub fn active_human_count(&self) -> usize {
        self.roster.values().filter(|s| s.is_active_human()).count()
    }

    /// Register a player. Returns its spawn index, or `None` if already present.
    pub fn add_player(&mut self, id: PlayerId, kind: PlayerKind, spectator: bool) -> Option<usize> {
        if self.roster.contains_key(&id) {
            return None;
        }
        let spawn_index = self.next_spawn;
        self.next_spawn += 1;
        self.roster.insert(id, PlayerSlot { id, kind, spectator, spawn_index });
        Some(spawn_index)
    }

    /// Unregister a player.
    pub fn remove_player(&mut self, id: &PlayerId) -> Option<PlayerSlot> {
        self.roster.remove(id)
    }

    // =========================================================================
    // Phase control
    // =========================================================================

    fn set_phase(&self, world: &mut World, new: MatchPhase, notices: &mut Vec<MatchNotice>) {
        let old = world.phase;
        if old == new {
            return;
        }
        world.phase = new;
        info!("match phase {:?} -> {:?}", old, new);
        notices.push(MatchNotice::PhaseChanged { old, new });
    }

    fn set_status(world: &mut World, player: PlayerId, status: PlayerStatus, notices: &mut Vec<MatchNotice>) {
        if let Some(c) = world.character_mut(&player) {
            if c.status != status {
                c.status = status;
                notices.push(MatchNotice::StatusChanged { player, status });
            }
        }
    }

    /// Start the countdown once the expected humans are present.
    ///
    /// A match already counting down or playing is left alone.
    pub fn attempt_start_game(&mut self, world: &mut World) -> Vec<MatchNotice> {
        let mut notices = Vec::new();
        if matches!(world.phase, MatchPhase::Countdown { .. } | MatchPhase::Playing) {
            return notices;
        }

        self.set_phase(world, MatchPhase::Waiting, &mut notices);

        let humans = self.active_human_count();
        if humans != self.config.expected_players {
            debug!("waiting for players: {}/{}", humans, self.config.expected_players);
            return notices;
        }

        for slot in self.roster.values().filter(|s| s.is_active_human()) {
            notices.push(MatchNotice::DisplayCountdown {
                player: slot.id,
                duration: self.config.countdown_duration,
            });
        }

        if self.config.countdown_duration > SMALL_DURATION && self.countdown_ticks > 0 {
            let countdown = MatchPhase::Countdown { ticks_remaining: self.countdown_ticks };
            self.set_phase(world, countdown, &mut notices);
        } else {
            notices.extend(self.start_game(world));
        }
        notices
    }

    /// Advance the countdown; starts the game when it runs out.
    pub fn update(&mut self, world: &mut World) -> Vec<MatchNotice> {
        match world.phase {
            MatchPhase::Countdown { ticks_remaining } if ticks_remaining <= 1 => self.start_game(world),
            MatchPhase::Countdown { ticks_remaining } => {
                world.phase = MatchPhase::Countdown { ticks_remaining: ticks_remaining - 1 };
                Vec::new()
            }
            MatchPhase::Playing => self.check_goal(world),
            _ => Vec::new(),
        }
    }

    /// Everyone playing, nobody winning, movement restored.
    pub fn start_game(&mut self, world: &mut World) -> Vec<MatchNotice> {
        let mut notices = Vec::new();
        self.set_phase(world, MatchPhase::Playing, &mut notices);
        self.results.clear();

        let players: Vec<PlayerId> = self
            .roster
            .values()
            .filter(|s| s.kind == PlayerKind::Ai || !s.spectator)
            .map(|s| s.id)
            .collect();
        for player in players {
            if let Some(c) = world.character_mut(&player) {
                c.movement.mode = MovementMode::Walking;
            }
            let status = PlayerStatus { game_state: PlayerGameState::Playing, is_winner: false };
            Self::set_status(world, player, status, &mut notices);
        }
        notices
    }

    /// Respawn a player waiting, then try to start.
    pub fn restart_player(&mut self, world: &mut World, player: PlayerId) -> Vec<MatchNotice> {
        let mut notices = self.respawn_player(world, player);
        notices.extend(self.attempt_start_game(world));
        notices
    }

    fn respawn_player(&self, world: &mut World, player: PlayerId) -> Vec<MatchNotice> {
        let mut notices = Vec::new();
        let Some(slot) = self.roster.get(&player).copied() else {
            return notices;
        };

        let spawn = world.spawn_point(slot.spawn_index);
        if let Some(c) = world.character_mut(&player) {
            c.restart();
            c.position = spawn;
            c.velocity = Vec3::ZERO;
            c.move_input = Vec3::ZERO;
            c.movement.on_ground = true;
            notices.push(MatchNotice::Respawned { player, position: spawn });
        }
        let status = PlayerStatus { game_state: PlayerGameState::Waiting, is_winner: false };
        Self::set_status(world, player, status, &mut notices);
        notices
    }

    /// A playing character reached the goal. The first one wins; once
    /// every active human has finished the match is complete.
    pub fn player_reached_end(&mut self, world: &mut World, player: PlayerId) -> Vec<MatchNotice> {
        let mut notices = Vec::new();
        let playing = world
            .character(&player)
            .map(|c| c.status.game_state == PlayerGameState::Playing)
            .unwrap_or(false);
        if !playing || world.phase != MatchPhase::Playing {
            return notices;
        }

        let winner = self.results.is_empty();
        self.results.push(player);
        if let Some(c) = world.character_mut(&player) {
            c.movement.mode = MovementMode::Disabled;
            c.move_input = Vec3::ZERO;
        }
        let status = PlayerStatus { game_state: PlayerGameState::Finished, is_winner: winner };
        Self::set_status(world, player, status, &mut notices);
        info!(player = %player, winner, "reached end");
        notices.push(MatchNotice::ReachedEnd { player, winner });

        let all_done = self.roster.values().filter(|s| s.is_active_human()).all(|s| {
            world
                .character(&s.id)
                .map(|c| c.status.game_state == PlayerGameState::Finished)
                .unwrap_or(true)
        });
        if all_done {
            self.set_phase(world, MatchPhase::Complete, &mut notices);
        }
        notices
    }

    /// Detect playing characters inside the goal zone.
    pub fn check_goal(&mut self, world: &mut World) -> Vec<MatchNotice> {
        let Some(goal) = self.config.goal else {
            return Vec::new();
        };
        let arrived: Vec<PlayerId> = world
            .characters
            .values()
            .filter(|c| c.status.game_state == PlayerGameState::Playing)
            .filter(|c| c.position.horizontal().distance(goal.center.horizontal()) <= goal.radius)
            .map(|c| c.id)
            .collect();

        arrived
            .into_iter()
            .flat_map(|player| self.player_reached_end(world, player))
            .collect()
    }

    /// Remove AI, reset the level, clear results, restart every player.
    pub fn restart_game(&mut self, world: &mut World) -> Vec<MatchNotice> {
        let mut notices = Vec::new();
        info!("restarting game");

        let agents: Vec<PlayerId> = self
            .roster
            .values()
            .filter(|s| s.kind == PlayerKind::Ai)
            .map(|s| s.id)
            .collect();
        for agent in agents {
            self.roster.remove(&agent);
            world.despawn_character(agent);
            notices.push(MatchNotice::AiRemoved { player: agent });
        }

        world.reset_level();
        self.results.clear();
        self.set_phase(world, MatchPhase::Waiting, &mut notices);

        let humans: Vec<PlayerId> = self
            .roster
            .values()
            .filter(|s| s.is_active_human())
            .map(|s| s.id)
            .collect();
        for player in humans {
            notices.push(MatchNotice::RestartGame { player });
            notices.extend(self.respawn_player(world, player));
        }
        notices.extend(self.attempt_start_game(world));
        notices
    }
}

// =============================================================================
// TESTS
// =============================================================================
