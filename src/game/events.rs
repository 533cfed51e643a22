//! Game Events
//!
//! Events generated during simulation. The authority logs them; observers
//! route the presentation ones (sound, rumble, HUD) to their services.

use serde::{Serialize, Deserialize};

use crate::core::vec3::Vec3;
use crate::game::state::{EffectKind, MatchPhase, ObjectId, PlayerId};

/// Sound cues played at a location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SoundCue {
    /// Character left the ground
    Jump,
    /// Thrown object struck a character
    Impact,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum GameEventData {
    /// Resolver target highlight changed (local visual)
    TargetHighlighted {
        /// Player concerned
        player_id: PlayerId,
        /// Object concerned
        object: ObjectId,
        /// Highlight on or off
        highlighted: bool,
    },

    /// Authority granted a pull claim
    ObjectClaimed {
        /// Player concerned
        player_id: PlayerId,
        /// Object concerned
        object: ObjectId,
    },

    /// Authority refused a pull claim
    PullRejected {
        /// Player concerned
        player_id: PlayerId,
        /// Object concerned
        object: ObjectId,
    },

    /// Pulled object reached the hand
    ObjectAttached {
        /// Player concerned
        player_id: PlayerId,
        /// Object concerned
        object: ObjectId,
    },

    /// Throw animation committed
    ThrowStarted {
        /// Player concerned
        player_id: PlayerId,
        /// Montage section played
        section: String,
    },

    /// Object left the hand
    ObjectLaunched {
        /// Player concerned
        player_id: PlayerId,
        /// Object concerned
        object: ObjectId,
        /// Launch velocity
        velocity: Vec3,
    },

    /// Throw animation over, collision restored
    ThrowFinished {
        /// Player concerned
        player_id: PlayerId,
    },

    /// Held or pulled object let go
    ObjectDropped {
        /// Player concerned
        player_id: PlayerId,
        /// Object concerned
        object: ObjectId,
    },

    /// Held object consumed for its effect
    ObjectUsed {
        /// Player concerned
        player_id: PlayerId,
        /// Object concerned
        object: ObjectId,
        /// Effect carried by the object
        effect: EffectKind,
    },

    /// Thrown object struck a character
    ObjectHitCharacter {
        /// Object concerned
        object: ObjectId,
        /// Character struck
        victim_id: PlayerId,
    },

    /// Thrown object came to rest
    ObjectLanded {
        /// Object concerned
        object: ObjectId,
    },

    /// Stun began
    StunBegan {
        /// Player concerned
        player_id: PlayerId,
        /// Stun strength (0..=1)
        ratio: f32,
        /// Duration (seconds)
        duration: f32,
    },

    /// Stun ended
    StunEnded {
        /// Player concerned
        player_id: PlayerId,
    },

    /// Buff/debuff applied
    EffectApplied {
        /// Player concerned
        player_id: PlayerId,
        /// Effect kind
        kind: EffectKind,
        /// Buff rather than debuff
        is_buff: bool,
    },

    /// Buff/debuff expired
    EffectEnded {
        /// Player concerned
        player_id: PlayerId,
        /// Effect kind
        kind: EffectKind,
        /// Buff rather than debuff
        is_buff: bool,
    },

    /// Play a sound at a location
    SoundPlayed {
        /// Sound to play
        cue: SoundCue,
        /// World position
        location: Vec3,
    },

    /// Rumble the player's controller
    ForceFeedback {
        /// Player concerned
        player_id: PlayerId,
        /// Rumble strength
        intensity: f32,
        /// Duration (seconds)
        duration: f32,
        /// Drive the large motor
        affect_large: bool,
        /// Drive the small motor
        affect_small: bool,
    },

    /// Show the pre-match countdown
    CountdownShown {
        /// Player concerned
        player_id: PlayerId,
        /// Duration (seconds)
        duration: f32,
    },

    /// Show the results screen
    ResultsShown {
        /// Player concerned
        player_id: PlayerId,
    },

    /// Remove the results screen
    ResultsCleared {
        /// Player concerned
        player_id: PlayerId,
    },

    /// Match phase changed
    PhaseChanged {
        /// Previous phase
        old_phase: MatchPhase,
        /// Current phase
        new_phase: MatchPhase,
    },

    /// Player reached the goal
    ReachedEnd {
        /// Player concerned
        player_id: PlayerId,
        /// First to finish
        winner: bool,
    },
}

/// A game event with timing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u32,

    /// Player involved (for filtering)
    pub player_id: Option<PlayerId>,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u32, data: GameEventData) -> Self {
        use GameEventData::*;
        let player_id = match &data {
            TargetHighlighted { player_id, .. }
            | ObjectClaimed { player_id, .. }
            | PullRejected { player_id, .. }
            | ObjectAttached { player_id, .. }
            | ThrowStarted { player_id, .. }
            | ObjectLaunched { player_id, .. }
            | ThrowFinished { player_id }
            | ObjectDropped { player_id, .. }
            | ObjectUsed { player_id, .. }
            | StunBegan { player_id, .. }
            | StunEnded { player_id }
            | EffectApplied { player_id, .. }
            | EffectEnded { player_id, .. }
            | ForceFeedback { player_id, .. }
            | CountdownShown { player_id, .. }
            | ResultsShown { player_id }
            | ResultsCleared { player_id }
            | ReachedEnd { player_id, .. } => Some(*player_id),
            ObjectHitCharacter { victim_id, .. } => Some(*victim_id),
            ObjectLanded { .. } | SoundPlayed { .. } | PhaseChanged { .. } => None,
        };

        Self { tick, player_id, data }
    }

    /// Create stun began event.
    pub fn stun_began(tick: u32, player_id: PlayerId, ratio: f32, duration: f32) -> Self {
        Self::new(tick, GameEventData::StunBegan { player_id, ratio, duration })
    }

    /// Create object dropped event.
    pub fn object_dropped(tick: u32, player_id: PlayerId, object: ObjectId) -> Self {
        Self::new(tick, GameEventData::ObjectDropped { player_id, object })
    }

    /// Create highlight event.
    pub fn highlight(tick: u32, player_id: PlayerId, object: ObjectId, highlighted: bool) -> Self {
        Self::new(tick, GameEventData::TargetHighlighted { player_id, object, highlighted })
    }

    /// Create phase changed event.
    pub fn phase_changed(tick: u32, old_phase: MatchPhase, new_phase: MatchPhase) -> Self {
        Self::new(tick, GameEventData::PhaseChanged { old_phase, new_phase })
    }

    /// Create force feedback event.
    pub fn force_feedback(
        tick: u32,
        player_id: PlayerId,
        intensity: f32,
        duration: f32,
        affect_large: bool,
        affect_small: bool,
    ) -> Self {
        Self::new(
            tick,
            GameEventData::ForceFeedback {
                player_id,
                intensity,
                duration,
                affect_large,
                affect_small,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_player_attribution() {
        let id = PlayerId::new([1; 16]);
        let victim = PlayerId::new([2; 16]);

        assert_eq!(GameEvent::stun_began(3, id, 1.0, 3.0).player_id, Some(id));

        let hit = GameEvent::new(3, GameEventData::ObjectHitCharacter {
            object: ObjectId(1),
            victim_id: victim,
        });
        assert_eq!(hit.player_id, Some(victim));

        let landed = GameEvent::new(3, GameEventData::ObjectLanded { object: ObjectId(1) });
        assert_eq!(landed.player_id, None);
    }
}
