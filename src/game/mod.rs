//! Game Logic Module
//!
//! Everything a replica simulates. The same code runs on the authority and
//! on every observer; only who is allowed to commit differs.
//!
//! ## Module Structure
//!
//! - `state`: Identifiers and shared enums (throw state, match phase, roles)
//! - `throw`: Per-character throw/pull state machine
//! - `target`: Interaction resolver (trace, highlight, auto-pull)
//! - `stun`: Stun and buff/debuff timers, fall impacts
//! - `character`: Character locomotion and status
//! - `interactable`: Throwable objects
//! - `world`: Characters, objects and obstacles plus their physics
//! - `match_flow`: Roster, countdown, goal and restart
//! - `input`: Controller frames to gameplay commands
//! - `animation`: Montage playback service
//! - `services`: Audio, force feedback and HUD collaborators
//! - `events`: Game events for logs and presentation

pub mod animation;
pub mod character;
pub mod events;
pub mod input;
pub mod interactable;
pub mod match_flow;
pub mod services;
pub mod state;
pub mod stun;
pub mod target;
pub mod throw;
pub mod world;

// Re-export key types
pub use character::{Character, PlayerStatus};
pub use events::{GameEvent, GameEventData};
pub use input::{Command, InputAdapter, InputFrame, PlayerInputBuffer};
pub use interactable::{Interactable, InteractableState};
pub use match_flow::{GameMode, PlayerKind};
pub use state::{MatchPhase, ObjectId, PlayerGameState, PlayerId, ThrowState};
pub use throw::ThrowInteraction;
pub use world::World;
