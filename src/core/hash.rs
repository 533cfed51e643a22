//! State Hashing for Replica Convergence
//!
//! Hashes the logical replicated state (throw states, claims, stun flags,
//! match phase) so the authority and every observer can be compared.
//! Positions and timers are excluded: they legitimately lag on observers.

use sha2::{Sha256, Digest};

/// Hash output type (256 bits / 32 bytes)
pub type StateHash = [u8; 32];

/// Hasher for replicated state.
///
/// Wraps SHA-256 with typed update helpers.
/// Order of updates is part of the hash.
pub struct StateHasher {
    hasher: Sha256,
}

impl StateHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Create hasher for world state.
    pub fn for_world_state() -> Self {
        Self::new(b"TANTRUMN_WORLD_V1")
    }

    /// Update with a u8 value.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.hasher.update([value]);
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Update with an optional u32, using `u32::MAX` for `None`.
    #[inline]
    pub fn update_opt_u32(&mut self, value: Option<u32>) {
        self.update_u32(value.unwrap_or(u32::MAX));
    }

    /// Update with a boolean.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(value as u8);
    }

    /// Update with a UUID (16 bytes).
    #[inline]
    pub fn update_uuid(&mut self, uuid: &[u8; 16]) {
        self.hasher.update(uuid);
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> StateHash {
        self.hasher.finalize().into()
    }
}

/// Compute the replicated-state hash.
///
/// This function is called by `World::compute_hash()`.
/// The closure adds the world-specific data.
pub fn compute_state_hash<F>(phase: u8, add_state: F) -> StateHash
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::for_world_state();
    hasher.update_u8(phase);
    add_state(&mut hasher);
    hasher.finalize()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_order_matters() {
        let hash1 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(1);
            h.update_u32(2);
            h.finalize()
        };

        let hash2 = {
            let mut h = StateHasher::new(b"test");
            h.update_u32(2);
            h.update_u32(1);
            h.finalize()
        };

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_optional_none_is_distinct() {
        let none = compute_state_hash(0, |h| h.update_opt_u32(None));
        let zero = compute_state_hash(0, |h| h.update_opt_u32(Some(0)));
        assert_ne!(none, zero);
    }

    #[test]
    fn test_compute_state_hash() {
        let make = |phase| {
            compute_state_hash(phase, |hasher| {
                hasher.update_uuid(&[7; 16]);
                hasher.update_bool(true);
            })
        };

        assert_eq!(make(1), make(1));
        assert_ne!(make(1), make(2));
    }
}
