//! Shared State Definitions
//!
//! Identifiers and the small enums replicated between the authority and
//! observers. Everything here is `Ord` so it can key a `BTreeMap`.

use std::fmt;
use serde::{Serialize, Deserialize};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique player identifier (UUID as bytes).
///
/// Implements Ord for stable BTreeMap ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct PlayerId(pub [u8; 16]);

impl PlayerId {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Generate a fresh random id.
    pub fn random() -> Self {
        Self(*uuid::Uuid::new_v4().as_bytes())
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Short hex prefix for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.short())
    }
}

/// Handle to an interactable object. Never owning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

// =============================================================================
// THROW STATE
// =============================================================================

/// Per-character pick-up/throw state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ThrowState {
    /// Hands free
    #[default]
    None = 0,
    /// Wants to pull whatever is targeted
    RequestingPull = 1,
    /// Object claimed and travelling to the hand
    Pulling = 2,
    /// Object held
    Attached = 3,
    /// Throw animation committed
    Throwing = 4,
    /// Object held in the aim pose
    Aiming = 5,
}

impl ThrowState {
    /// States in which the character holds (or is receiving) an object.
    #[inline]
    pub fn is_holding(self) -> bool {
        matches!(self, Self::Pulling | Self::Attached | Self::Aiming | Self::Throwing)
    }

    /// States in which the interaction resolver runs.
    #[inline]
    pub fn is_scanning(self) -> bool {
        matches!(self, Self::None | Self::RequestingPull)
    }
}

// =============================================================================
// PLAYER / MATCH STATE
// =============================================================================

/// Per-player progress through a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PlayerGameState {
    /// Spawned, match not running for this player
    #[default]
    Waiting = 0,
    /// Racing
    Playing = 1,
    /// Reached the goal
    Finished = 2,
}

/// Global match phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchPhase {
    /// Waiting for the expected players
    #[default]
    Waiting,
    /// Countdown before play
    Countdown {
        /// Ticks until play starts
        ticks_remaining: u32,
    },
    /// Match running
    Playing,
    /// Every player finished
    Complete,
}

impl MatchPhase {
    /// Compact code for hashing (countdown ticks excluded).
    pub fn code(&self) -> u8 {
        match self {
            MatchPhase::Waiting => 0,
            MatchPhase::Countdown { .. } => 1,
            MatchPhase::Playing => 2,
            MatchPhase::Complete => 3,
        }
    }
}

/// Which copy of a character this is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetRole {
    /// The arbitrating copy on the server
    Authority,
    /// The locally controlled copy on its owner's client
    Autonomous,
    /// A mirrored copy of somebody else's character
    Simulated,
}

/// Kind of buff/debuff an object grants.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EffectKind {
    /// No effect
    #[default]
    None,
    /// Speed: buff doubles sprint speed, debuff disables movement
    Speed,
}

/// Character locomotion mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MovementMode {
    /// Normal walking/falling
    #[default]
    Walking,
    /// Movement input ignored
    Disabled,
}
