//! Protocol Messages
//!
//! Intents sent by an owning client to the authority and the broadcasts
//! the authority sends back. Serialized as JSON for debugging ease, and
//! as bincode for the compact wire format. Enums are externally tagged
//! so both encodings work.

use serde::{Serialize, Deserialize};

use crate::core::vec3::Vec3;
use crate::game::character::{CharacterSnapshot, PlayerStatus};
use crate::game::interactable::ObjectSnapshot;
use crate::game::state::{EffectKind, MatchPhase, ObjectId, PlayerId, ThrowState};

// =============================================================================
// CLIENT -> AUTHORITY
// =============================================================================

/// A player's request to change state, validated by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Start (`true`) or stop (`false`) requesting a pull.
    PullRequest(bool),

    /// Enter (`true`) or leave (`false`) the aim pose.
    ToggleAim(bool),

    /// Throw animation started on the owner.
    RequestThrow,

    /// Release marker reached: launch now.
    BeginThrow,

    /// Throw animation over: restore collision.
    FinishThrow,

    /// Claim this object.
    PullObject(ObjectId),

    /// Sprint pressed.
    SprintStart,

    /// Sprint released.
    SprintEnd,

    /// Consume the held object for its effect.
    UseObject,

    /// Let go of the held object.
    DropObject,

    /// Locomotion input and camera.
    Movement {
        /// Desired horizontal movement
        direction: Vec3,
        /// Body facing
        facing: Vec3,
        /// Camera direction
        view_forward: Vec3,
    },

    /// Jump pressed.
    Jump,

    /// Retry selected on the results screen.
    RestartLevel,
}

impl Intent {
    /// Whether this intent can change the sender's throw state. Only these
    /// hold back reconciliation on the owner.
    pub fn affects_throw(&self) -> bool {
        matches!(
            self,
            Self::PullRequest(_)
                | Self::PullObject(_)
                | Self::ToggleAim(_)
                | Self::RequestThrow
                | Self::BeginThrow
                | Self::FinishThrow
                | Self::UseObject
                | Self::DropObject
        )
    }
}

/// Sequenced intent from one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientMessage {
    /// Per-client sequence number, starting at 1
    pub seq: u32,
    /// Sending player
    pub player: PlayerId,
    /// The request
    pub intent: Intent,
}

impl ClientMessage {
    /// Create a message.
    pub fn new(seq: u32, player: PlayerId, intent: Intent) -> Self {
        Self { seq, player, intent }
    }
}

// =============================================================================
// AUTHORITY -> OBSERVERS
// =============================================================================

/// Messages broadcast by the authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerMessage {
    /// Committed throw state of a character.
    ThrowStateSync {
        /// Player concerned
        player: PlayerId,
        /// Committed throw state
        state: ThrowState,
        /// Held or pulled object
        held: Option<ObjectId>,
        /// Highest intent sequence from this player processed so far
        ack_seq: u32,
    },

    /// Pulled object arrived in the hand.
    ThrowableAttached {
        /// Player concerned
        player: PlayerId,
        /// Object concerned
        object: ObjectId,
    },

    /// Throw animation committed on the authority.
    ThrowStarted {
        /// Player concerned
        player: PlayerId,
        /// Montage section played
        section: String,
    },

    /// Object left the hand.
    ObjectLaunched {
        /// Player concerned
        player: PlayerId,
        /// Object concerned
        object: ObjectId,
        /// Launch velocity
        velocity: Vec3,
    },

    /// Interactable state.
    ObjectSync(ObjectSnapshot),

    /// Character locomotion.
    CharacterSync(CharacterSnapshot),

    /// Character stunned.
    Stunned {
        /// Player concerned
        player: PlayerId,
        /// Stun strength (0..=1)
        ratio: f32,
    },

    /// Buff/debuff applied.
    EffectApplied {
        /// Player concerned
        player: PlayerId,
        /// Effect kind
        kind: EffectKind,
        /// Buff rather than debuff
        is_buff: bool,
    },

    /// Rumble the owner's controller.
    ForceFeedback {
        /// Player concerned
        player: PlayerId,
        /// Rumble strength
        intensity: f32,
        /// Duration (seconds)
        duration: f32,
        /// Drive the large motor
        affect_large: bool,
        /// Drive the small motor
        affect_small: bool,
    },

    /// Play the celebrate animation.
    PlayCelebrate {
        /// Player concerned
        player: PlayerId,
    },

    /// Global match phase.
    MatchPhase(MatchPhase),

    /// Player progress.
    PlayerStatus {
        /// Player concerned
        player: PlayerId,
        /// New status
        status: PlayerStatus,
    },

    /// Show the countdown on the owner's screen.
    DisplayCountdown {
        /// Player concerned
        player: PlayerId,
        /// Duration (seconds)
        duration: f32,
    },

    /// Clear the owner's results screen.
    RestartGame {
        /// Player concerned
        player: PlayerId,
    },

    /// The owner's run is over.
    ReachedEnd {
        /// Player concerned
        player: PlayerId,
        /// First to finish
        winner: bool,
    },

    /// A character joined.
    SpawnCharacter {
        /// Player concerned
        player: PlayerId,
        /// Spawn position
        position: Vec3,
    },

    /// A character left.
    DespawnCharacter {
        /// Player concerned
        player: PlayerId,
    },
}

impl ServerMessage {
    /// Player that alone should receive this message, if it is addressed.
    pub fn recipient(&self) -> Option<PlayerId> {
        match *self {
            Self::ForceFeedback { player, .. }
            | Self::DisplayCountdown { player, .. }
            | Self::RestartGame { player }
            | Self::ReachedEnd { player, .. } => Some(player),
            _ => None,
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary (bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary (bincode).
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Serialize to binary (bincode).
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary (bincode).
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::interactable::InteractableState;

    #[test]
    fn test_intent_json_shape() {
        let msg = ClientMessage::new(4, PlayerId::new([1; 16]), Intent::PullObject(ObjectId(3)));
        let json = msg.to_json().unwrap();
        assert!(json.contains("\"pull_object\":3"));
        assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);

        let json = Intent::RequestThrow;
        assert_eq!(serde_json::to_string(&json).unwrap(), "\"request_throw\"");
    }

    #[test]
    fn test_binary_client_messages() {
        let player = PlayerId::new([2; 16]);
        let intents = vec![
            Intent::PullRequest(true),
            Intent::ToggleAim(false),
            Intent::BeginThrow,
            Intent::Movement {
                direction: Vec3::new(1.0, 0.0, 0.0),
                facing: Vec3::FORWARD,
                view_forward: Vec3::RIGHT,
            },
            Intent::RestartLevel,
        ];

        for (seq, intent) in intents.into_iter().enumerate() {
            let msg = ClientMessage::new(seq as u32 + 1, player, intent);
            let bytes = msg.to_bytes().unwrap();
            assert_eq!(ClientMessage::from_bytes(&bytes).unwrap(), msg);
        }
    }

    #[test]
    fn test_binary_server_messages() {
        let player = PlayerId::new([3; 16]);
        let messages = vec![
            ServerMessage::ThrowStateSync {
                player,
                state: ThrowState::Attached,
                held: Some(ObjectId(1)),
                ack_seq: 12,
            },
            ServerMessage::ThrowStarted { player, section: "AimStart".to_string() },
            ServerMessage::ObjectSync(ObjectSnapshot {
                object: ObjectId(1),
                position: Vec3::new(1.0, 2.0, 3.0),
                velocity: Vec3::ZERO,
                state: InteractableState::Thrown { by: player },
                destroyed: false,
                ignored_actor: Some(player),
            }),
            ServerMessage::MatchPhase(MatchPhase::Countdown { ticks_remaining: 30 }),
            ServerMessage::PlayerStatus { player, status: PlayerStatus::default() },
        ];

        for msg in messages {
            let bytes = msg.to_bytes().unwrap();
            assert_eq!(ServerMessage::from_bytes(&bytes).unwrap(), msg);
            let json = msg.to_json().unwrap();
            assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);
        }
    }

    #[test]
    fn test_addressed_messages() {
        let player = PlayerId::new([4; 16]);
        assert_eq!(
            ServerMessage::DisplayCountdown { player, duration: 4.0 }.recipient(),
            Some(player)
        );
        assert_eq!(ServerMessage::Stunned { player, ratio: 1.0 }.recipient(), None);
    }

    #[test]
    fn test_throw_affecting_intents() {
        assert!(Intent::PullObject(ObjectId(1)).affects_throw());
        assert!(Intent::DropObject.affects_throw());
        assert!(!Intent::Jump.affects_throw());
        assert!(!Intent::Movement {
            direction: Vec3::ZERO,
            facing: Vec3::FORWARD,
            view_forward: Vec3::FORWARD,
        }
        .affects_throw());
    }
}
