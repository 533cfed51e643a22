//! # Tantrumn Server
//!
//! Networked throw/pull gameplay for a party racing game: players pull
//! objects into their hands, aim and throw them, get stunned by hits and
//! hard landings, and race to a goal.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TANTRUMN SERVER                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  config.rs       - Tuning, level layout, JSON loading        │
//! │                                                              │
//! │  core/           - Shared primitives                         │
//! │  ├── vec3.rs     - 3D vector math                            │
//! │  └── hash.rs     - State hashing for convergence checks      │
//! │                                                              │
//! │  game/           - Simulation (runs on every replica)        │
//! │  ├── throw.rs    - Throw/pull state machine                  │
//! │  ├── target.rs   - Interaction resolver                      │
//! │  ├── stun.rs     - Stun and effect timers                    │
//! │  ├── world.rs    - Characters, objects, physics              │
//! │  ├── match_flow.rs - Countdown, goal, restart                │
//! │  └── input.rs    - Controller adapter                        │
//! │                                                              │
//! │  network/        - Replication                               │
//! │  ├── authority.rs - Validates intents, commits, broadcasts   │
//! │  ├── observer.rs - Client prediction and mirroring           │
//! │  ├── channel.rs  - Reliable-ordered, latency-stamped frames  │
//! │  ├── protocol.rs - Message types                             │
//! │  └── session.rs  - Wires authority and clients together      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Authority Model
//!
//! The authority is the only replica that commits claims, launches, stuns
//! and match transitions. Observers predict their own character's throw
//! state and reconcile against acknowledged syncs; everything else they
//! mirror. Iteration order is always `BTreeMap` order, so every replica
//! applies the same messages the same way and the state hashes converge.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{ConfigError, GameConfig};
pub use core::vec3::Vec3;
pub use game::input::{InputFrame, PlayerInputBuffer};
pub use game::state::{ObjectId, PlayerId, ThrowState};
pub use network::{Authority, Observer, Session};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Simulation tick rate (Hz)
pub const TICK_RATE: u32 = 60;
