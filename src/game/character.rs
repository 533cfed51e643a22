//! Player Character
//!
//! A character is a composition of plain components driven by explicit
//! calls from the world tick: locomotion, the throw/pull machine, the stun
//! timer, the effect slot and the player's match status.

use serde::{Serialize, Deserialize};

use crate::config::CharacterConfig;
use crate::core::vec3::Vec3;
use crate::game::state::{EffectKind, MovementMode, NetRole, PlayerGameState, PlayerId};
use crate::game::stun::{EffectState, StunState};
use crate::game::target::ResolverInput;
use crate::game::throw::{ResetOutcome, ThrowInteraction};

// =============================================================================
// COMPONENTS
// =============================================================================

/// Locomotion caps and mode.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    /// Walking speed cap
    pub walk_speed: f32,
    /// Sprinting speed cap (doubled by a speed buff)
    pub sprint_speed: f32,
    /// Cap currently in force
    pub max_speed: f32,
    /// Sprint held
    pub is_sprinting: bool,
    /// Walking or disabled
    pub mode: MovementMode,
    /// Standing on the ground
    pub on_ground: bool,
}

/// Player progress in the match.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStatus {
    /// Waiting, playing or finished
    pub game_state: PlayerGameState,
    /// First to reach the goal
    pub is_winner: bool,
}

/// Outcome of a stun that actually began.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StunBegun {
    /// Stun length (seconds)
    pub duration: f32,
    /// Objects to release; `None` when a committed throw survived
    pub reset: Option<ResetOutcome>,
}

/// Replicated locomotion view of a character.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CharacterSnapshot {
    /// Character
    pub player: PlayerId,
    /// Feet position
    pub position: Vec3,
    /// Velocity
    pub velocity: Vec3,
    /// Body facing
    pub facing: Vec3,
    /// Camera direction
    pub view_forward: Vec3,
    /// Locomotion
    pub movement: Movement,
}

// =============================================================================
// CHARACTER
// =============================================================================

/// One replica of a player character.
#[derive(Clone, Debug)]
pub struct Character {
    /// Owning player
    pub id: PlayerId,
    /// Which copy this is
    pub role: NetRole,
    /// Feet position
    pub position: Vec3,
    /// Velocity
    pub velocity: Vec3,
    /// Body facing (unit, horizontal)
    pub facing: Vec3,
    /// Camera direction (unit)
    pub view_forward: Vec3,
    /// Desired horizontal movement, length ≤ 1
    pub move_input: Vec3,
    /// Locomotion
    pub movement: Movement,
    /// Pick-up/throw machine
    pub throw: ThrowInteraction,
    /// Stun timer
    pub stun: StunState,
    /// Buff/debuff slot
    pub effect: EffectState,
    /// Match status
    pub status: PlayerStatus,
    config: CharacterConfig,
}

impl Character {
    /// Spawn a character facing +X.
    pub fn new(id: PlayerId, role: NetRole, position: Vec3, config: &CharacterConfig) -> Self {
        Self {
            id,
            role,
            position,
            velocity: Vec3::ZERO,
            facing: Vec3::FORWARD,
            view_forward: Vec3::FORWARD,
            move_input: Vec3::ZERO,
            movement: Movement {
                walk_speed: config.walk_speed,
                sprint_speed: config.sprint_speed,
                max_speed: config.walk_speed,
                is_sprinting: false,
                mode: MovementMode::Walking,
                on_ground: position.z <= 0.0,
            },
            throw: ThrowInteraction::default(),
            stun: StunState::default(),
            effect: EffectState::default(),
            status: PlayerStatus::default(),
            config: config.clone(),
        }
    }

    /// Owner's own copy on its client.
    #[inline]
    pub fn is_locally_controlled(&self) -> bool {
        self.role == NetRole::Autonomous
    }

    /// Currently stunned.
    #[inline]
    pub fn is_stunned(&self) -> bool {
        self.stun.is_stunned
    }

    /// Squared speed.
    #[inline]
    pub fn speed_squared(&self) -> f32 {
        self.velocity.length_squared()
    }

    /// Origin of actor-transform traces.
    pub fn trace_origin(&self) -> Vec3 {
        self.position + Vec3::UP * self.config.trace_height
    }

    /// Camera position behind the character.
    pub fn view_location(&self) -> Vec3 {
        self.trace_origin() - self.view_forward * self.config.camera_distance
    }

    /// Where a held object sits.
    pub fn hold_point(&self, hold_height: f32) -> Vec3 {
        self.position + Vec3::UP * hold_height
    }

    /// What the target resolver reads from this character.
    pub fn resolver_input(&self) -> ResolverInput {
        ResolverInput {
            player: self.id,
            state: self.throw.state(),
            stunned: self.is_stunned(),
            current_target: self.throw.target(),
            actor_location: self.trace_origin(),
            facing: self.facing,
            view_location: self.view_location(),
            view_forward: self.view_forward,
            speed_squared: self.speed_squared(),
        }
    }

    /// Can locomotion input move the character?
    #[inline]
    pub fn can_move(&self) -> bool {
        self.movement.mode == MovementMode::Walking && !self.is_stunned()
    }

    // =========================================================================
    // Sprint / jump
    // =========================================================================

    /// Raise the speed cap to sprint speed. Refused while stunned.
    pub fn request_sprint_start(&mut self) -> bool {
        if self.is_stunned() {
            return false;
        }
        self.movement.max_speed = self.movement.sprint_speed;
        self.movement.is_sprinting = true;
        true
    }

    /// Back to the walking cap. Returns whether a sprint was running.
    pub fn request_sprint_end(&mut self) -> bool {
        let was_sprinting = self.movement.is_sprinting;
        self.movement.max_speed = self.movement.walk_speed;
        self.movement.is_sprinting = false;
        was_sprinting
    }

    /// Leave the ground. Only from the ground, walking and not stunned.
    pub fn jump(&mut self) -> bool {
        if !self.movement.on_ground || !self.can_move() {
            return false;
        }
        self.velocity.z = self.config.jump_velocity;
        self.movement.on_ground = false;
        true
    }

    // =========================================================================
    // Stun
    // =========================================================================

    /// Begin a stun. No stacking: returns `None` if already stunned.
    pub fn begin_stun(&mut self, ratio: f32) -> Option<StunBegun> {
        if !self.stun.begin(ratio, &self.config) {
            return None;
        }
        if self.movement.is_sprinting {
            self.request_sprint_end();
        }
        self.move_input = Vec3::ZERO;
        Some(StunBegun {
            duration: self.stun.duration,
            reset: self.throw.stun_reset(),
        })
    }

    /// Advance the stun timer. Returns true when the stun ends.
    pub fn update_stun(&mut self, dt: f32) -> bool {
        self.stun.update(dt)
    }

    // =========================================================================
    // Effects
    // =========================================================================

    /// Apply a buff/debuff. Ignored while another effect is active.
    pub fn apply_effect(&mut self, kind: EffectKind, is_buff: bool) -> bool {
        if !self.effect.begin(kind, is_buff, self.config.default_effect_cooldown) {
            return false;
        }
        match kind {
            EffectKind::Speed if is_buff => self.movement.sprint_speed *= 2.0,
            EffectKind::Speed => self.movement.mode = MovementMode::Disabled,
            EffectKind::None => {}
        }
        true
    }

    /// Count the effect down; reverts it on expiry.
    pub fn update_effect(&mut self, dt: f32) -> Option<(EffectKind, bool)> {
        let ended = self.effect.update(dt)?;
        match ended {
            (EffectKind::Speed, true) => {
                self.movement.sprint_speed /= 2.0;
                self.request_sprint_end();
            }
            (EffectKind::Speed, false) => self.movement.mode = MovementMode::Walking,
            (EffectKind::None, _) => {}
        }
        Some(ended)
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    /// Integrate one step. Returns the vertical speed of a landing.
    pub fn integrate(&mut self, dt: f32) -> Option<f32> {
        let horizontal = if self.can_move() {
            let input = self.move_input.horizontal();
            let input = if input.length_squared() > 1.0 { input.normalize() } else { input };
            input * self.movement.max_speed
        } else {
            Vec3::ZERO
        };
        self.velocity.x = horizontal.x;
        self.velocity.y = horizontal.y;

        if !self.movement.on_ground {
            self.velocity.z -= self.config.gravity * dt;
        }
        self.position += self.velocity * dt;

        if !self.movement.on_ground && self.position.z <= 0.0 {
            let impact = -self.velocity.z;
            self.position.z = 0.0;
            self.velocity.z = 0.0;
            self.movement.on_ground = true;
            return Some(impact);
        }
        None
    }

    /// Back to waiting with walking restored.
    pub fn restart(&mut self) {
        self.movement.mode = MovementMode::Walking;
        self.status.game_state = PlayerGameState::Waiting;
    }

    /// Replicated locomotion view.
    pub fn snapshot(&self) -> CharacterSnapshot {
        CharacterSnapshot {
            player: self.id,
            position: self.position,
            velocity: self.velocity,
            facing: self.facing,
            view_forward: self.view_forward,
            movement: self.movement,
        }
    }

    /// Mirror the authority's locomotion.
    ///
    /// The owner keeps its own camera direction, which it drives locally.
    pub fn apply_snapshot(&mut self, snapshot: &CharacterSnapshot) {
        self.position = snapshot.position;
        self.velocity = snapshot.velocity;
        self.movement = snapshot.movement;
        if !self.is_locally_controlled() {
            self.facing = snapshot.facing;
            self.view_forward = snapshot.view_forward;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
