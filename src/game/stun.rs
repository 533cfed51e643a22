//! Stun and Effect Timers
//!
//! Per-character countdowns that gate input processing:
//! - Stun: begins from a ratio in [0, 1], never stacks.
//! - Fall impact: maps landing speed to a stun ratio and feedback profile.
//! - Effect: a single buff/debuff slot with a cooldown.

use serde::{Serialize, Deserialize};

use crate::config::CharacterConfig;
use crate::game::state::EffectKind;

// =============================================================================
// STUN
// =============================================================================

/// Stun duration for a ratio, clamped to [0, 1].
#[inline]
pub fn stun_duration(ratio: f32, min_stun: f32, max_stun: f32) -> f32 {
    let ratio = ratio.clamp(0.0, 1.0);
    min_stun + ratio * (max_stun - min_stun)
}

/// Stun countdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StunState {
    /// Currently stunned
    pub is_stunned: bool,
    /// Time spent stunned so far (seconds)
    pub timer: f32,
    /// Total stun length (seconds)
    pub duration: f32,
}

impl StunState {
    /// Begin a stun. Returns false (and changes nothing) if already stunned.
    pub fn begin(&mut self, ratio: f32, config: &CharacterConfig) -> bool {
        if self.is_stunned {
            return false;
        }
        self.duration = stun_duration(ratio, config.min_stun_time, config.max_stun_time);
        self.timer = 0.0;
        self.is_stunned = true;
        true
    }

    /// Advance the timer. Returns true on the update that ends the stun.
    pub fn update(&mut self, dt: f32) -> bool {
        if !self.is_stunned {
            return false;
        }
        self.timer += dt;
        if self.timer >= self.duration {
            *self = Self::default();
            return true;
        }
        false
    }
}

// =============================================================================
// FALL IMPACT
// =============================================================================

/// Controller rumble profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackProfile {
    /// Small motors only
    Small,
    /// Large motors only; the landing also stuns
    Large,
}

/// Result of a hard landing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FallImpact {
    /// Stun ratio in [0, 1]
    pub ratio: f32,
    /// Feedback profile to play
    pub profile: FeedbackProfile,
}

impl FallImpact {
    /// Large impacts stun.
    #[inline]
    pub fn stuns(&self) -> bool {
        self.profile == FeedbackProfile::Large
    }
}

/// Classify a landing by its vertical speed.
///
/// Below `min_impact_speed` nothing happens; at or above
/// `max_impact_speed` the ratio clamps to 1.0.
pub fn fall_impact(vertical_speed: f32, config: &CharacterConfig) -> Option<FallImpact> {
    let speed = vertical_speed.abs();
    if speed < config.min_impact_speed {
        return None;
    }

    let band = config.max_impact_speed - config.min_impact_speed;
    let ratio = ((speed - config.min_impact_speed) / band).clamp(0.0, 1.0);
    let profile = if ratio > config.large_impact_ratio {
        FeedbackProfile::Large
    } else {
        FeedbackProfile::Small
    };

    Some(FallImpact { ratio, profile })
}

// =============================================================================
// EFFECT
// =============================================================================

/// Single buff/debuff slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectState {
    /// An effect is running
    pub active: bool,
    /// Which effect
    pub kind: EffectKind,
    /// Buff or debuff
    pub is_buff: bool,
    /// Remaining time (seconds)
    pub cooldown: f32,
}

impl EffectState {
    /// Start an effect. Ignored while another is active.
    pub fn begin(&mut self, kind: EffectKind, is_buff: bool, cooldown: f32) -> bool {
        if self.active {
            return false;
        }
        *self = Self {
            active: true,
            kind,
            is_buff,
            cooldown,
        };
        true
    }

    /// Count down. Returns the expired `(kind, is_buff)` on the update that
    /// ends the effect.
    pub fn update(&mut self, dt: f32) -> Option<(EffectKind, bool)> {
        if !self.active {
            return None;
        }
        self.cooldown -= dt;
        if self.cooldown <= 0.0 {
            let ended = (self.kind, self.is_buff);
            *self = Self::default();
            return Some(ended);
        }
        None
    }
}

// =============================================================================
// TESTS
// =============================================================================
