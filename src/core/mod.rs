//! Core primitives.
//!
//! Math and hashing shared by the authority and every observer replica.

pub mod vec3;
pub mod hash;

// Re-export core types
pub use vec3::Vec3;
pub use hash::{compute_state_hash, StateHash};
