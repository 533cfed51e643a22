//! Interactable Objects
//!
//! Throwables that can be targeted, pulled, carried, thrown and used.
//! Claims are exclusive: an object is held by at most one character.

use serde::{Serialize, Deserialize};

use crate::core::vec3::Vec3;
use crate::game::state::{EffectKind, ObjectId, PlayerId};

/// Lifecycle of an interactable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum InteractableState {
    /// Free in the world
    #[default]
    Idle,
    /// Claimed and travelling to the puller
    Pulled {
        /// Claiming character
        by: PlayerId,
    },
    /// In a character's hand
    Attached {
        /// Holding character
        by: PlayerId,
    },
    /// In flight after a throw
    Thrown {
        /// Throwing character
        by: PlayerId,
    },
}

impl InteractableState {
    /// Compact code for hashing.
    pub fn code(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Pulled { .. } => 1,
            Self::Attached { .. } => 2,
            Self::Thrown { .. } => 3,
        }
    }

    /// Character currently owning the object, if any.
    pub fn owner(&self) -> Option<PlayerId> {
        match *self {
            Self::Idle => None,
            Self::Pulled { by } | Self::Attached { by } | Self::Thrown { by } => Some(by),
        }
    }
}

/// Replicated view of an interactable.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    /// Object handle
    pub object: ObjectId,
    /// Position
    pub position: Vec3,
    /// Velocity
    pub velocity: Vec3,
    /// Lifecycle state
    pub state: InteractableState,
    /// Removed from play
    pub destroyed: bool,
    /// Character it currently does not collide with
    pub ignored_actor: Option<PlayerId>,
}

/// A throwable object.
#[derive(Clone, Debug, PartialEq)]
pub struct Interactable {
    /// Handle
    pub id: ObjectId,
    /// Centre position
    pub position: Vec3,
    /// Velocity
    pub velocity: Vec3,
    /// Collision radius
    pub radius: f32,
    /// Lifecycle state
    pub state: InteractableState,
    /// Local highlight visual (never replicated)
    pub highlighted: bool,
    /// Effect granted when used
    pub effect: EffectKind,
    /// Character excluded from collision while thrown
    pub ignored_actor: Option<PlayerId>,
    /// Used up; waits for a level reset
    pub destroyed: bool,
    /// Time in flight (seconds)
    pub flight_time: f32,
    /// Spawn position restored by a level reset
    home: Vec3,
}

impl Interactable {
    /// Create an idle object at rest.
    pub fn new(id: ObjectId, position: Vec3, radius: f32, effect: EffectKind) -> Self {
        Self {
            id,
            position,
            velocity: Vec3::ZERO,
            radius,
            state: InteractableState::Idle,
            highlighted: false,
            effect,
            ignored_actor: None,
            destroyed: false,
            flight_time: 0.0,
            home: position,
        }
    }

    /// Free to be targeted and claimed.
    #[inline]
    pub fn is_idle(&self) -> bool {
        !self.destroyed && self.state == InteractableState::Idle
    }

    /// Owning character, if any.
    #[inline]
    pub fn holder(&self) -> Option<PlayerId> {
        self.state.owner()
    }

    /// Claim for `by`. Fails if not idle.
    pub fn pull(&mut self, by: PlayerId) -> bool {
        if !self.is_idle() {
            return false;
        }
        self.state = InteractableState::Pulled { by };
        self.velocity = Vec3::ZERO;
        self.highlighted = false;
        true
    }

    /// Arrived in `by`'s hand. Only valid after `by` pulled it.
    pub fn attach(&mut self, by: PlayerId) -> bool {
        if self.state != (InteractableState::Pulled { by }) {
            return false;
        }
        self.state = InteractableState::Attached { by };
        self.velocity = Vec3::ZERO;
        true
    }

    /// Launch from `by`'s hand, ignoring collision with the thrower.
    pub fn launch(&mut self, by: PlayerId, velocity: Vec3) -> bool {
        if self.state != (InteractableState::Attached { by }) {
            return false;
        }
        self.state = InteractableState::Thrown { by };
        self.velocity = velocity;
        self.ignored_actor = Some(by);
        self.flight_time = 0.0;
        true
    }

    /// Let go while pulled or held; the object falls freely.
    pub fn drop_object(&mut self) -> bool {
        match self.state {
            InteractableState::Pulled { .. } | InteractableState::Attached { .. } => {
                self.state = InteractableState::Idle;
                self.velocity = Vec3::ZERO;
                true
            }
            _ => false,
        }
    }

    /// Collide with the thrower again.
    pub fn restore_collision(&mut self, by: PlayerId) {
        if self.ignored_actor == Some(by) {
            self.ignored_actor = None;
        }
    }

    /// Come to rest after a flight.
    pub fn land(&mut self) {
        if let InteractableState::Thrown { by } = self.state {
            self.restore_collision(by);
        }
        self.state = InteractableState::Idle;
        self.velocity = Vec3::ZERO;
        self.flight_time = 0.0;
    }

    /// Remove from play.
    pub fn destroy(&mut self) {
        self.destroyed = true;
        self.state = InteractableState::Idle;
        self.highlighted = false;
        self.velocity = Vec3::ZERO;
    }

    /// Back to the spawn point, idle.
    pub fn reset(&mut self) {
        *self = Self::new(self.id, self.home, self.radius, self.effect);
    }

    /// Set the local highlight. Returns true if it changed.
    pub fn toggle_highlight(&mut self, on: bool) -> bool {
        let changed = self.highlighted != on;
        self.highlighted = on;
        changed
    }

    /// Replicated view.
    pub fn snapshot(&self) -> ObjectSnapshot {
        ObjectSnapshot {
            object: self.id,
            position: self.position,
            velocity: self.velocity,
            state: self.state,
            destroyed: self.destroyed,
            ignored_actor: self.ignored_actor,
        }
    }

    /// Mirror the authority's view, keeping the local highlight unless the
    /// object is no longer targetable.
    pub fn apply_snapshot(&mut self, snapshot: &ObjectSnapshot) {
        self.position = snapshot.position;
        self.velocity = snapshot.velocity;
        self.state = snapshot.state;
        self.destroyed = snapshot.destroyed;
        self.ignored_actor = snapshot.ignored_actor;
        if !self.is_idle() {
            self.highlighted = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> Interactable {
        Interactable::new(ObjectId(1), Vec3::new(100.0, 0.0, 40.0), 40.0, EffectKind::Speed)
    }

    #[test]
    fn test_claim_is_exclusive() {
        let a = PlayerId::new([1; 16]);
        let b = PlayerId::new([2; 16]);
        let mut obj = object();

        assert!(obj.pull(a));
        assert!(!obj.pull(b));
        assert_eq!(obj.holder(), Some(a));
    }

    #[test]
    fn test_full_cycle_returns_to_idle() {
        let a = PlayerId::new([1; 16]);
        let mut obj = object();

        assert!(obj.pull(a));
        assert!(obj.attach(a));
        assert!(obj.launch(a, Vec3::new(2000.0, 0.0, 0.0)));
        assert_eq!(obj.ignored_actor, Some(a));
        assert!(!obj.is_idle());

        obj.land();
        assert!(obj.is_idle());
        assert_eq!(obj.ignored_actor, None);
    }

    #[test]
    fn test_attach_requires_matching_puller() {
        let a = PlayerId::new([1; 16]);
        let b = PlayerId::new([2; 16]);
        let mut obj = object();

        assert!(!obj.attach(a));
        obj.pull(a);
        assert!(!obj.attach(b));
        assert!(!obj.launch(a, Vec3::FORWARD));
    }

    #[test]
    fn test_destroy_and_reset() {
        let a = PlayerId::new([1; 16]);
        let mut obj = object();
        obj.pull(a);
        obj.position = Vec3::new(500.0, 0.0, 140.0);
        obj.destroy();
        assert!(!obj.is_idle());
        assert!(!obj.pull(a));

        obj.reset();
        assert!(obj.is_idle());
        assert_eq!(obj.position, Vec3::new(100.0, 0.0, 40.0));
    }

    #[test]
    fn test_snapshot_clears_stale_highlight() {
        let a = PlayerId::new([1; 16]);
        let mut local = object();
        local.toggle_highlight(true);

        let mut remote = object();
        remote.pull(a);
        local.apply_snapshot(&remote.snapshot());

        assert_eq!(local.state, InteractableState::Pulled { by: a });
        assert!(!local.highlighted);
    }
}
