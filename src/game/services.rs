//! Presentation Services
//!
//! Audio/feedback and HUD collaborators. Gameplay never depends on their
//! results; observers route events to them after each tick.

use tracing::info;

use crate::core::vec3::Vec3;
use crate::game::events::{GameEvent, GameEventData, SoundCue};
use crate::game::state::PlayerId;

/// Audio and controller feedback.
pub trait FeedbackService {
    /// Play a positional sound cue.
    fn play_sound_at(&mut self, cue: SoundCue, location: Vec3);

    /// Rumble a player's controller.
    fn play_force_feedback(
        &mut self,
        player: PlayerId,
        intensity: f32,
        duration: f32,
        affect_large: bool,
        affect_small: bool,
    );
}

/// Widgets on a player's screen.
pub trait HudService {
    /// Show the pre-match countdown.
    fn show_countdown(&mut self, player: PlayerId, duration: f32);

    /// Show the results screen.
    fn show_results(&mut self, player: PlayerId);

    /// Remove the results screen.
    fn clear_results(&mut self, player: PlayerId);
}

/// Route presentation events to the services. Other events are ignored.
pub fn dispatch<S>(events: &[GameEvent], services: &mut S)
where
    S: FeedbackService + HudService,
{
    for event in events {
        match event.data {
            GameEventData::SoundPlayed { cue, location } => services.play_sound_at(cue, location),
            GameEventData::ForceFeedback {
                player_id,
                intensity,
                duration,
                affect_large,
                affect_small,
            } => services.play_force_feedback(player_id, intensity, duration, affect_large, affect_small),
            GameEventData::CountdownShown { player_id, duration } => {
                services.show_countdown(player_id, duration)
            }
            GameEventData::ResultsShown { player_id } => services.show_results(player_id),
            GameEventData::ResultsCleared { player_id } => services.clear_results(player_id),
            _ => {}
        }
    }
}

// =============================================================================
// IMPLEMENTATIONS
// =============================================================================

/// Services that only log.
#[derive(Debug, Default)]
pub struct LogServices;

impl FeedbackService for LogServices {
    fn play_sound_at(&mut self, cue: SoundCue, location: Vec3) {
        info!("sound {:?} at {}", cue, location);
    }

    fn play_force_feedback(
        &mut self,
        player: PlayerId,
        intensity: f32,
        duration: f32,
        affect_large: bool,
        affect_small: bool,
    ) {
        info!(
            "force feedback for {}: {:.2} for {:.2}s (large={}, small={})",
            player, intensity, duration, affect_large, affect_small
        );
    }
}

impl HudService for LogServices {
    fn show_countdown(&mut self, player: PlayerId, duration: f32) {
        info!("countdown {:.1}s shown to {}", duration, player);
    }

    fn show_results(&mut self, player: PlayerId) {
        info!("results shown to {}", player);
    }

    fn clear_results(&mut self, player: PlayerId) {
        info!("results cleared for {}", player);
    }
}

/// Recorded service call.
#[derive(Clone, Debug, PartialEq)]
pub enum ServiceCall {
    /// `play_sound_at`
    Sound(SoundCue, Vec3),
    /// `play_force_feedback`
    ForceFeedback {
        /// Player concerned
        player: PlayerId,
        /// Rumble strength
        intensity: f32,
        /// Drive the large motor
        affect_large: bool,
        /// Drive the small motor
        affect_small: bool,
    },
    /// `show_countdown`
    Countdown(PlayerId, f32),
    /// `show_results`
    ShowResults(PlayerId),
    /// `clear_results`
    ClearResults(PlayerId),
}

/// Services that record every call, for tests and replays.
#[derive(Debug, Default)]
pub struct RecordingServices {
    /// Calls in order
    pub calls: Vec<ServiceCall>,
}

impl FeedbackService for RecordingServices {
    fn play_sound_at(&mut self, cue: SoundCue, location: Vec3) {
        self.calls.push(ServiceCall::Sound(cue, location));
    }

    fn play_force_feedback(
        &mut self,
        player: PlayerId,
        intensity: f32,
        _duration: f32,
        affect_large: bool,
        affect_small: bool,
    ) {
        self.calls.push(ServiceCall::ForceFeedback {
            player,
            intensity,
            affect_large,
            affect_small,
        });
    }
}

impl HudService for RecordingServices {
    fn show_countdown(&mut self, player: PlayerId, duration: f32) {
        self.calls.push(ServiceCall::Countdown(player, duration));
    }

    fn show_results(&mut self, player: PlayerId) {
        self.calls.push(ServiceCall::ShowResults(player));
    }

    fn clear_results(&mut self, player: PlayerId) {
        self.calls.push(ServiceCall::ClearResults(player));
    }
}
