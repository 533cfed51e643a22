//! Runtime Configuration
//!
//! Every tunable of the simulation lives here, including the debug toggles
//! for trace visualisation. Loaded from JSON; missing fields fall back to
//! their defaults.

use std::path::Path;
use serde::{Serialize, Deserialize};
use thiserror::Error;

use crate::core::vec3::Vec3;
use crate::game::animation::MontageClip;
use crate::game::state::EffectKind;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// Config file is not valid JSON for `GameConfig`.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    /// A value is out of its allowed range.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

// =============================================================================
// SECTIONS
// =============================================================================

/// Locomotion, stun and effect tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharacterConfig {
    /// Walking speed cap (cm/s)
    pub walk_speed: f32,
    /// Sprinting speed cap (cm/s)
    pub sprint_speed: f32,
    /// Upward launch speed of a jump (cm/s)
    pub jump_velocity: f32,
    /// Gravity (cm/s², positive)
    pub gravity: f32,
    /// Collision radius used for hits and traces
    pub capsule_radius: f32,
    /// Height of the trace origin above the feet
    pub trace_height: f32,
    /// Camera distance behind the character
    pub camera_distance: f32,
    /// Landing speed below which nothing happens
    pub min_impact_speed: f32,
    /// Landing speed at which the stun ratio reaches 1.0
    pub max_impact_speed: f32,
    /// Stun duration at ratio 0 (seconds)
    pub min_stun_time: f32,
    /// Stun duration at ratio 1 (seconds)
    pub max_stun_time: f32,
    /// Impact ratio above which feedback is "large" and stuns
    pub large_impact_ratio: f32,
    /// Duration of landing force feedback (seconds)
    pub force_feedback_duration: f32,
    /// Duration of a buff/debuff window (seconds)
    pub default_effect_cooldown: f32,
}

impl Default for CharacterConfig {
    fn default() -> Self {
        Self {
            walk_speed: 600.0,
            sprint_speed: 1200.0,
            jump_velocity: 700.0,
            gravity: 980.0,
            capsule_radius: 42.0,
            trace_height: 40.0,
            camera_distance: 300.0,
            min_impact_speed: 800.0,
            max_impact_speed: 1600.0,
            min_stun_time: 1.0,
            max_stun_time: 3.0,
            large_impact_ratio: 0.5,
            force_feedback_duration: 0.5,
            default_effect_cooldown: 5.0,
        }
    }
}

/// Pull and throw tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrowConfig {
    /// Launch speed along the thrower's forward vector (cm/s)
    pub throw_speed: f32,
    /// Actor speed² must be below this for a pull to start
    pub pull_speed_sq_threshold: f32,
    /// Maximum distance from the puller to the object
    pub pull_range: f32,
    /// Speed at which a pulled object travels to the hand (cm/s)
    pub pull_travel_speed: f32,
    /// Height of the hold point above the feet
    pub hold_height: f32,
    /// Radius of spawned throwables
    pub object_radius: f32,
    /// Flight time after which a thrown object is forced to land (seconds)
    pub max_flight_time: f32,
}

impl Default for ThrowConfig {
    fn default() -> Self {
        Self {
            throw_speed: 2000.0,
            pull_speed_sq_threshold: 100.0,
            pull_range: 1500.0,
            pull_travel_speed: 1500.0,
            hold_height: 100.0,
            object_radius: 40.0,
            max_flight_time: 5.0,
        }
    }
}

/// How the interaction resolver probes the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceMode {
    /// Sphere cast from the camera along the view direction
    SphereCastPlayerView,
    /// Sphere cast from the character along its facing
    SphereCastActorTransform,
    /// Line cast from the character along its facing
    LineCastActorTransform,
}

/// Interaction resolver tuning and debug toggles.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Probe shape and origin
    pub mode: TraceMode,
    /// Probe length
    pub distance: f32,
    /// Sphere cast radius
    pub radius: f32,
    /// Below this view·facing dot the probe is suppressed
    pub min_view_dot: f32,
    /// Log every probe and its hit
    pub display_trace: bool,
    /// Log launch velocities
    pub display_throw_velocity: bool,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            mode: TraceMode::SphereCastPlayerView,
            distance: 1000.0,
            radius: 70.0,
            min_view_dot: -0.23,
            display_trace: false,
            display_throw_velocity: false,
        }
    }
}

/// Montage assets. `None` means the montage is not bound.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Throw montage
    pub throw_montage: Option<MontageClip>,
    /// Celebrate montage
    pub celebrate_montage: Option<MontageClip>,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            throw_montage: Some(MontageClip::throw_default()),
            celebrate_montage: Some(MontageClip::celebrate_default()),
        }
    }
}

/// Goal volume; entering it ends a player's run.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GoalZone {
    /// Centre of the zone
    pub center: Vec3,
    /// Horizontal radius
    pub radius: f32,
}

/// Match flow tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchConfig {
    /// Non-spectating human players needed to start
    pub expected_players: usize,
    /// Countdown before play starts (seconds)
    pub countdown_duration: f32,
    /// Finish line
    pub goal: Option<GoalZone>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            expected_players: 3,
            countdown_duration: 4.0,
            goal: Some(GoalZone {
                center: Vec3::new(4000.0, 0.0, 0.0),
                radius: 300.0,
            }),
        }
    }
}

/// Transport tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// One-way latency of every channel (ticks)
    pub latency_ticks: u32,
    /// Maximum connected clients
    pub max_players: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            latency_ticks: 3,
            max_players: 8,
        }
    }
}

/// Throwable placed by the level.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThrowableSpawn {
    /// Resting position
    pub position: Vec3,
    /// Effect granted when used
    pub effect: EffectKind,
}

/// Static sphere blocking probes.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObstacleSpawn {
    /// Centre
    pub center: Vec3,
    /// Radius
    pub radius: f32,
}

/// Level layout, loaded identically by every replica.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelConfig {
    /// Player spawn points, used round-robin
    pub spawn_points: Vec<Vec3>,
    /// Throwables
    pub throwables: Vec<ThrowableSpawn>,
    /// Obstacles
    pub obstacles: Vec<ObstacleSpawn>,
}

impl Default for LevelConfig {
    fn default() -> Self {
        Self {
            spawn_points: vec![
                Vec3::new(0.0, -400.0, 0.0),
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(0.0, 400.0, 0.0),
                Vec3::new(0.0, 800.0, 0.0),
            ],
            throwables: vec![
                ThrowableSpawn { position: Vec3::new(600.0, -400.0, 40.0), effect: EffectKind::Speed },
                ThrowableSpawn { position: Vec3::new(600.0, 0.0, 40.0), effect: EffectKind::None },
                ThrowableSpawn { position: Vec3::new(600.0, 400.0, 40.0), effect: EffectKind::Speed },
                ThrowableSpawn { position: Vec3::new(1500.0, 0.0, 40.0), effect: EffectKind::None },
            ],
            obstacles: vec![ObstacleSpawn { center: Vec3::new(2500.0, 200.0, 100.0), radius: 150.0 }],
        }
    }
}

// =============================================================================
// GAME CONFIG
// =============================================================================

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Simulation rate (Hz)
    pub tick_rate: u32,
    /// Character tuning
    pub character: CharacterConfig,
    /// Pull/throw tuning
    pub throwing: ThrowConfig,
    /// Resolver tuning
    pub trace: TraceConfig,
    /// Montage assets
    pub animation: AnimationConfig,
    /// Match flow
    pub match_flow: MatchConfig,
    /// Transport
    pub net: NetConfig,
    /// Level layout
    pub level: LevelConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            character: CharacterConfig::default(),
            throwing: ThrowConfig::default(),
            trace: TraceConfig::default(),
            animation: AnimationConfig::default(),
            match_flow: MatchConfig::default(),
            net: NetConfig::default(),
            level: LevelConfig::default(),
        }
    }
}

impl GameConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values the simulation cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be positive".into()));
        }
        let c = &self.character;
        if c.max_impact_speed <= c.min_impact_speed {
            return Err(ConfigError::Invalid(
                "max_impact_speed must exceed min_impact_speed".into(),
            ));
        }
        if c.max_stun_time < c.min_stun_time || c.min_stun_time < 0.0 {
            return Err(ConfigError::Invalid("stun time range is inverted".into()));
        }
        if c.walk_speed <= 0.0 || c.sprint_speed <= 0.0 {
            return Err(ConfigError::Invalid("movement speeds must be positive".into()));
        }
        if self.trace.distance <= 0.0 || self.trace.radius < 0.0 {
            return Err(ConfigError::Invalid("trace distance/radius out of range".into()));
        }
        if self.level.spawn_points.is_empty() {
            return Err(ConfigError::Invalid("level needs at least one spawn point".into()));
        }
        if self.match_flow.countdown_duration < 0.0 {
            return Err(ConfigError::Invalid("countdown_duration is negative".into()));
        }
        Ok(())
    }

    /// Seconds per tick.
    #[inline]
    pub fn delta_time(&self) -> f32 {
        1.0 / self.tick_rate as f32
    }

    /// Convert a duration in seconds to whole ticks (rounded up).
    pub fn seconds_to_ticks(&self, seconds: f32) -> u32 {
        (seconds * self.tick_rate as f32).ceil().max(0.0) as u32
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GameConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trace.mode, TraceMode::SphereCastPlayerView);
        assert_eq!(config.match_flow.expected_players, 3);
        assert_eq!(config.seconds_to_ticks(4.0), 240);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "tick_rate": 30,
            "trace": { "mode": "line_cast_actor_transform", "display_trace": true },
            "net": { "latency_ticks": 0 }
        }"#;
        let config = GameConfig::from_json(json).unwrap();

        assert_eq!(config.tick_rate, 30);
        assert_eq!(config.trace.mode, TraceMode::LineCastActorTransform);
        assert!(config.trace.display_trace);
        assert_eq!(config.trace.distance, 1000.0);
        assert_eq!(config.net.latency_ticks, 0);
        assert_eq!(config.character.sprint_speed, 1200.0);
    }

    #[test]
    fn test_unbound_montage_from_json() {
        let config = GameConfig::from_json(r#"{ "animation": { "throw_montage": null } }"#).unwrap();
        assert!(config.animation.throw_montage.is_none());
        assert!(config.animation.celebrate_montage.is_some());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = GameConfig::from_json(r#"{ "tick_rate": 0 }"#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = GameConfig::from_json(
            r#"{ "character": { "min_impact_speed": 900.0, "max_impact_speed": 800.0 } }"#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));

        let result = GameConfig::from_json("{ not json");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_json_roundtrip_preserves_config() {
        let config = GameConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(GameConfig::from_json(&json).unwrap(), config);
    }
}
