//! Throw/Pull State Machine
//!
//! Local transitions of one character's pick-up/throw loop:
//!
//! ```text
//!  None ──pull──▶ RequestingPull ──claim──▶ Pulling ──attach──▶ Attached ◀──▶ Aiming
//!   ▲                  │ stop                                      │            │
//!   └──────────────────┘                                           └── throw ───┴──▶ Throwing
//!   ▲                                                                                  │
//!   └──────────────────────────── release marker ─────────────────────────────────────┘
//! ```
//!
//! Every transition is a guarded no-op when its precondition fails. The
//! same machine runs on the authority (validation) and on each observer
//! (prediction and mirroring).

use serde::{Serialize, Deserialize};

use crate::game::state::{ObjectId, ThrowState};

/// Objects to release after a forced reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResetOutcome {
    /// Held object that must be dropped
    pub dropped: Option<ObjectId>,
    /// Target whose highlight must be cleared
    pub unhighlight: Option<ObjectId>,
}

/// Pick-up/throw state of one character.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThrowInteraction {
    state: ThrowState,
    held: Option<ObjectId>,
    target: Option<ObjectId>,
}

impl ThrowInteraction {
    /// Current state.
    #[inline]
    pub fn state(&self) -> ThrowState {
        self.state
    }

    /// Object pulled or held.
    #[inline]
    pub fn held(&self) -> Option<ObjectId> {
        self.held
    }

    /// Object currently highlighted by the resolver.
    #[inline]
    pub fn target(&self) -> Option<ObjectId> {
        self.target
    }

    /// Must be holding (Attached or Aiming) to throw or use.
    #[inline]
    pub fn can_throw(&self) -> bool {
        matches!(self.state, ThrowState::Attached | ThrowState::Aiming)
    }

    /// Only a plain hold can enter the aim pose.
    #[inline]
    pub fn can_aim(&self) -> bool {
        self.state == ThrowState::Attached
    }

    /// In the aim pose.
    #[inline]
    pub fn is_aiming(&self) -> bool {
        self.state == ThrowState::Aiming
    }

    /// `None → RequestingPull`, refused while stunned.
    pub fn request_pull(&mut self, stunned: bool) -> bool {
        if stunned || self.state != ThrowState::None {
            return false;
        }
        self.state = ThrowState::RequestingPull;
        true
    }

    /// `RequestingPull → None`. Returns the target to un-highlight.
    pub fn stop_pull(&mut self) -> Option<ResetOutcome> {
        if self.state != ThrowState::RequestingPull {
            return None;
        }
        Some(self.reset())
    }

    /// `RequestingPull → Pulling` on a successful claim of `object`.
    pub fn begin_pulling(&mut self, object: ObjectId) -> bool {
        if self.state != ThrowState::RequestingPull {
            return false;
        }
        self.state = ThrowState::Pulling;
        self.held = Some(object);
        self.target = None;
        true
    }

    /// `Pulling → Attached` once the pulled object arrives.
    pub fn attach(&mut self, object: ObjectId) -> bool {
        if self.state != ThrowState::Pulling || self.held != Some(object) {
            return false;
        }
        self.state = ThrowState::Attached;
        true
    }

    /// Authoritative attachment confirmation; applied whatever the local state.
    pub fn confirm_attached(&mut self, object: ObjectId) -> Option<ObjectId> {
        let previous_target = self.target.take();
        self.state = ThrowState::Attached;
        self.held = Some(object);
        previous_target
    }

    /// `Attached → Aiming`.
    pub fn request_aim(&mut self) -> bool {
        if !self.can_aim() {
            return false;
        }
        self.state = ThrowState::Aiming;
        true
    }

    /// `Aiming → Attached`.
    pub fn stop_aim(&mut self) -> bool {
        if self.state != ThrowState::Aiming {
            return false;
        }
        self.state = ThrowState::Attached;
        true
    }

    /// `Attached/Aiming → Throwing`. Callers gate this on the throw
    /// animation actually starting.
    pub fn enter_throwing(&mut self) -> bool {
        if !self.can_throw() {
            return false;
        }
        self.state = ThrowState::Throwing;
        true
    }

    /// `Throwing → None` at the release marker. Returns the released object.
    pub fn release(&mut self) -> Option<ObjectId> {
        if self.state != ThrowState::Throwing {
            return None;
        }
        self.state = ThrowState::None;
        self.held.take()
    }

    /// Hand the held object to something else (used up), back to `None`.
    pub fn consume_held(&mut self) -> Option<ObjectId> {
        if !self.can_throw() {
            return None;
        }
        self.state = ThrowState::None;
        self.held.take()
    }

    /// Drop everything and return to `None`.
    pub fn reset(&mut self) -> ResetOutcome {
        let outcome = ResetOutcome {
            dropped: self.held.take(),
            unhighlight: self.target.take(),
        };
        self.state = ThrowState::None;
        outcome
    }

    /// Reset forced by a stun. A committed throw is not cancelled: the
    /// launch still completes at the release marker.
    pub fn stun_reset(&mut self) -> Option<ResetOutcome> {
        if self.state == ThrowState::Throwing {
            return None;
        }
        Some(self.reset())
    }

    /// Track a new resolver target. Returns the previous one.
    pub fn set_target(&mut self, target: Option<ObjectId>) -> Option<ObjectId> {
        std::mem::replace(&mut self.target, target)
    }

    /// Overwrite with an authoritative state.
    pub fn overwrite(&mut self, state: ThrowState, held: Option<ObjectId>) -> Option<ObjectId> {
        self.state = state;
        self.held = held;
        if !state.is_scanning() {
            return self.target.take();
        }
        None
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const OBJ: ObjectId = ObjectId(7);

    fn holding() -> ThrowInteraction {
        let mut t = ThrowInteraction::default();
        assert!(t.request_pull(false));
        assert!(t.begin_pulling(OBJ));
        assert!(t.attach(OBJ));
        t
    }

    #[test]
    fn test_pull_from_none_only_reaches_requesting() {
        let mut t = ThrowInteraction::default();
        assert!(t.request_pull(false));
        assert_eq!(t.state(), ThrowState::RequestingPull);

        // Second request is a no-op
        assert!(!t.request_pull(false));
        assert_eq!(t.state(), ThrowState::RequestingPull);
    }

    #[test]
    fn test_pull_refused_while_stunned() {
        let mut t = ThrowInteraction::default();
        assert!(!t.request_pull(true));
        assert_eq!(t.state(), ThrowState::None);
    }

    #[test]
    fn test_stop_pull_idempotent() {
        let mut t = ThrowInteraction::default();
        assert!(t.stop_pull().is_none());
        assert!(t.stop_pull().is_none());
        assert_eq!(t.state(), ThrowState::None);

        t.request_pull(false);
        t.set_target(Some(OBJ));
        let outcome = t.stop_pull().unwrap();
        assert_eq!(outcome.unhighlight, Some(OBJ));
        assert_eq!(t.state(), ThrowState::None);
        assert!(t.stop_pull().is_none());
    }

    #[test]
    fn test_aim_toggle() {
        let mut t = holding();
        assert!(t.request_aim());
        assert!(t.is_aiming());
        assert!(!t.request_aim());
        assert!(t.stop_aim());
        assert_eq!(t.state(), ThrowState::Attached);
        assert!(!t.stop_aim());
    }

    #[test]
    fn test_throw_releases_object() {
        let mut t = holding();
        assert!(t.release().is_none());
        assert!(t.enter_throwing());
        assert!(!t.enter_throwing());
        assert_eq!(t.release(), Some(OBJ));
        assert_eq!(t.state(), ThrowState::None);
        assert_eq!(t.held(), None);
    }

    #[test]
    fn test_stun_resets_holding_states() {
        for aim in [false, true] {
            let mut t = holding();
            if aim {
                t.request_aim();
            }
            let outcome = t.stun_reset().unwrap();
            assert_eq!(outcome.dropped, Some(OBJ));
            assert_eq!(t.state(), ThrowState::None);
            assert_eq!(t.held(), None);
        }

        let mut pulling = ThrowInteraction::default();
        pulling.request_pull(false);
        pulling.begin_pulling(OBJ);
        assert_eq!(pulling.stun_reset().unwrap().dropped, Some(OBJ));
    }

    #[test]
    fn test_stun_does_not_cancel_committed_throw() {
        let mut t = holding();
        t.enter_throwing();
        assert!(t.stun_reset().is_none());
        assert_eq!(t.state(), ThrowState::Throwing);
        assert_eq!(t.release(), Some(OBJ));
    }

    #[test]
    fn test_use_consumes_held() {
        let mut idle = ThrowInteraction::default();
        assert!(idle.consume_held().is_none());

        let mut t = holding();
        assert_eq!(t.consume_held(), Some(OBJ));
        assert_eq!(t.state(), ThrowState::None);
        assert!(t.held().is_none());
    }

    #[test]
    fn test_overwrite_clears_target_when_not_scanning() {
        let mut t = ThrowInteraction::default();
        t.set_target(Some(OBJ));
        assert_eq!(t.overwrite(ThrowState::RequestingPull, None), None);
        assert_eq!(t.target(), Some(OBJ));
        assert_eq!(t.overwrite(ThrowState::Attached, Some(ObjectId(3))), Some(OBJ));
        assert_eq!(t.held(), Some(ObjectId(3)));
    }
}
