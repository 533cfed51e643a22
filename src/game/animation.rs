//! Animation Playback
//!
//! Montage playback with authored markers. Gameplay hooks into playback
//! through `AnimationService::advance`, which yields edge-triggered marker
//! and finish events. The throw release is marker-driven, never timed.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};

use crate::config::AnimationConfig;
use crate::game::state::PlayerId;

/// Section played for a throw from the hip.
pub const SECTION_DEFAULT: &str = "Default";
/// Section played for a throw out of the aim pose.
pub const SECTION_AIM_START: &str = "AimStart";
/// Section played after the celebrate montage when the player won.
pub const SECTION_WINNER: &str = "Winner";
/// Marker at which the held object leaves the hand.
pub const MARKER_THROW_RELEASE: &str = "ThrowRelease";

// =============================================================================
// CLIPS
// =============================================================================

/// Montages a character can play.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Montage {
    /// Throw the held object
    Throw,
    /// Reached the goal
    Celebrate,
}

/// Named time range inside a montage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MontageSection {
    /// Section name
    pub name: String,
    /// Start time (seconds)
    pub start: f32,
    /// End time (seconds)
    pub end: f32,
}

/// Authored point in a montage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnimationMarker {
    /// Marker name
    pub name: String,
    /// Time within the montage (seconds)
    pub time: f32,
}

/// Playable montage asset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MontageClip {
    /// Sections, each played independently
    pub sections: Vec<MontageSection>,
    /// Markers across the whole montage
    pub markers: Vec<AnimationMarker>,
}

impl MontageClip {
    /// Find a section by name.
    pub fn section(&self, name: &str) -> Option<&MontageSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Default throw montage: the aim section skips the wind-up.
    pub fn throw_default() -> Self {
        Self {
            sections: vec![
                MontageSection { name: SECTION_DEFAULT.into(), start: 0.0, end: 1.0 },
                MontageSection { name: SECTION_AIM_START.into(), start: 0.35, end: 1.0 },
            ],
            markers: vec![AnimationMarker { name: MARKER_THROW_RELEASE.into(), time: 0.5 }],
        }
    }

    /// Default celebrate montage.
    pub fn celebrate_default() -> Self {
        Self {
            sections: vec![
                MontageSection { name: SECTION_DEFAULT.into(), start: 0.0, end: 1.5 },
                MontageSection { name: SECTION_WINNER.into(), start: 1.5, end: 3.0 },
            ],
            markers: Vec::new(),
        }
    }
}

// =============================================================================
// SERVICE
// =============================================================================

/// Playback notification.
#[derive(Clone, Debug, PartialEq)]
pub enum AnimationEvent {
    /// Playback crossed a marker
    MarkerReached {
        /// Character playing the montage
        player: PlayerId,
        /// Montage that carries the marker
        montage: Montage,
        /// Marker name
        name: String,
    },
    /// Playback ended, naturally or by being replaced/stopped
    Finished {
        /// Character that was playing
        player: PlayerId,
        /// Montage that ended
        montage: Montage,
        /// Replaced or stopped before reaching its end
        interrupted: bool,
    },
}

/// Animation collaborator.
///
/// One montage slot per character; playing a new montage interrupts the old.
pub trait AnimationService {
    /// Start a montage section. Returns false when it cannot be played.
    fn play(&mut self, player: PlayerId, montage: Montage, section: &str) -> bool;

    /// Stop whatever the character is playing.
    fn stop(&mut self, player: PlayerId);

    /// Is this montage currently playing on the character?
    fn is_playing(&self, player: PlayerId, montage: Montage) -> bool;

    /// Advance playback, returning markers crossed and montages finished.
    fn advance(&mut self, dt: f32) -> Vec<AnimationEvent>;

    /// Drop all playback state for a despawned character, without events.
    fn forget(&mut self, player: PlayerId);
}

#[derive(Clone, Debug)]
struct Playback {
    montage: Montage,
    time: f32,
    end: f32,
}

/// Clip-driven animation service used by every replica.
#[derive(Clone, Debug, Default)]
pub struct SimulatedAnimator {
    clips: BTreeMap<Montage, MontageClip>,
    active: BTreeMap<PlayerId, Playback>,
    pending: Vec<AnimationEvent>,
}

impl SimulatedAnimator {
    /// Build from configured clips. Missing clips simply fail to play.
    pub fn new(config: &AnimationConfig) -> Self {
        let mut clips = BTreeMap::new();
        if let Some(clip) = &config.throw_montage {
            clips.insert(Montage::Throw, clip.clone());
        }
        if let Some(clip) = &config.celebrate_montage {
            clips.insert(Montage::Celebrate, clip.clone());
        }
        Self {
            clips,
            ..Default::default()
        }
    }
}

impl AnimationService for SimulatedAnimator {
    fn play(&mut self, player: PlayerId, montage: Montage, section: &str) -> bool {
        let Some(section) = self.clips.get(&montage).and_then(|c| c.section(section)) else {
            return false;
        };
        if section.end <= section.start {
            return false;
        }

        let playback = Playback {
            montage,
            time: section.start,
            end: section.end,
        };
        if let Some(previous) = self.active.insert(player, playback) {
            self.pending.push(AnimationEvent::Finished {
                player,
                montage: previous.montage,
                interrupted: true,
            });
        }
        true
    }

    fn stop(&mut self, player: PlayerId) {
        if let Some(previous) = self.active.remove(&player) {
            self.pending.push(AnimationEvent::Finished {
                player,
                montage: previous.montage,
                interrupted: true,
            });
        }
    }

    fn is_playing(&self, player: PlayerId, montage: Montage) -> bool {
        self.active.get(&player).map(|p| p.montage == montage).unwrap_or(false)
    }

    fn advance(&mut self, dt: f32) -> Vec<AnimationEvent> {
        let mut events = std::mem::take(&mut self.pending);
        let mut finished = Vec::new();

        for (player, playback) in self.active.iter_mut() {
            let prev = playback.time;
            let next = (prev + dt).min(playback.end);
            let at_end = next >= playback.end;

            if let Some(clip) = self.clips.get(&playback.montage) {
                for marker in &clip.markers {
                    // Half-open window, closed at the very end of the section
                    let crossed = marker.time >= prev
                        && (marker.time < next || (at_end && marker.time <= playback.end));
                    if crossed {
                        events.push(AnimationEvent::MarkerReached {
                            player: *player,
                            montage: playback.montage,
                            name: marker.name.clone(),
                        });
                    }
                }
            }

            playback.time = next;
            if at_end {
                finished.push((*player, playback.montage));
            }
        }

        for (player, montage) in finished {
            self.active.remove(&player);
            events.push(AnimationEvent::Finished {
                player,
                montage,
                interrupted: false,
            });
        }

        events
    }

    fn forget(&mut self, player: PlayerId) {
        self.active.remove(&player);
        self.pending.retain(|e| match e {
            AnimationEvent::MarkerReached { player: p, .. } | AnimationEvent::Finished { player: p, .. } => *p != player,
        });
    }
}

// =============================================================================
// TESTS
// =============================================================================
