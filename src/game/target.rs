//! Interaction Target Resolver
//!
//! Per-tick probe run by the locally controlled character while its throw
//! state is `None` or `RequestingPull`. Picks the idle interactable in
//! front of the player, moves the highlight onto it and, when the player is
//! requesting a pull and standing still, triggers the pull.
//!
//! The resolver is pure: it reads the world through `SpatialQuery` and
//! returns a `TargetUpdate` for the caller to apply.

use serde::{Serialize, Deserialize};

use crate::config::{TraceConfig, TraceMode};
use crate::core::vec3::Vec3;
use crate::game::state::{ObjectId, PlayerId, ThrowState};

// =============================================================================
// SPATIAL QUERY
// =============================================================================

/// What a probe hit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum HitActor {
    /// An interactable object
    Interactable(ObjectId),
    /// Another character
    Character(PlayerId),
    /// Static level geometry
    Obstacle(u32),
}

/// Nearest blocking hit of a probe.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitResult {
    /// Something blocked the probe
    pub blocking: bool,
    /// What blocked it
    pub actor: Option<HitActor>,
    /// Closest point on the probe to the hit
    pub point: Vec3,
}

impl HitResult {
    /// Probe hit nothing.
    pub fn miss(end: Vec3) -> Self {
        Self {
            blocking: false,
            actor: None,
            point: end,
        }
    }

    /// Interactable hit by a blocking probe.
    pub fn interactable(&self) -> Option<ObjectId> {
        match (self.blocking, self.actor) {
            (true, Some(HitActor::Interactable(id))) => Some(id),
            _ => None,
        }
    }
}

/// Spatial query collaborator.
pub trait SpatialQuery {
    /// Sweep a sphere of `radius` (0 for a line) from `origin` to `end`,
    /// skipping `ignore`, and return the nearest blocking hit.
    fn cast_shape(&self, origin: Vec3, end: Vec3, radius: f32, ignore: Option<PlayerId>) -> HitResult;

    /// Is the object free to be targeted?
    fn is_idle_interactable(&self, object: ObjectId) -> bool;
}

// =============================================================================
// RESOLVER
// =============================================================================

/// Character state the resolver reads.
#[derive(Clone, Copy, Debug)]
pub struct ResolverInput {
    /// Probing character
    pub player: PlayerId,
    /// Its throw state
    pub state: ThrowState,
    /// Stunned characters do not probe
    pub stunned: bool,
    /// Currently highlighted object
    pub current_target: Option<ObjectId>,
    /// Actor-transform probe origin
    pub actor_location: Vec3,
    /// Body facing
    pub facing: Vec3,
    /// Camera position
    pub view_location: Vec3,
    /// Camera direction
    pub view_forward: Vec3,
    /// Squared actor speed
    pub speed_squared: f32,
}

/// Changes the caller applies after a probe.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TargetUpdate {
    /// Object to un-highlight
    pub unhighlight: Option<ObjectId>,
    /// Object to highlight
    pub highlight: Option<ObjectId>,
    /// New tracked target
    pub target: Option<ObjectId>,
    /// Pull to trigger (state goes to `Pulling`)
    pub auto_pull: Option<ObjectId>,
    /// Probe skipped because the camera looks too far behind the body
    pub suppressed: bool,
}

impl TargetUpdate {
    /// Leave everything as is.
    fn unchanged(current: Option<ObjectId>) -> Self {
        Self {
            target: current,
            ..Default::default()
        }
    }
}

/// Run one probe for `input`.
pub fn resolve_target<Q: SpatialQuery>(
    input: &ResolverInput,
    config: &TraceConfig,
    pull_speed_sq_threshold: f32,
    world: &Q,
) -> TargetUpdate {
    if input.stunned || !input.state.is_scanning() {
        return TargetUpdate::unchanged(input.current_target);
    }

    let (origin, end, radius) = match config.mode {
        TraceMode::SphereCastPlayerView => {
            if input.view_forward.dot(input.facing) < config.min_view_dot {
                return TargetUpdate {
                    unhighlight: input.current_target,
                    suppressed: true,
                    ..Default::default()
                };
            }
            let extra = input.view_location.distance(input.actor_location);
            let end = input.view_location + input.view_forward * (config.distance + extra);
            (input.view_location, end, config.radius)
        }
        TraceMode::SphereCastActorTransform => {
            let end = input.actor_location + input.facing * config.distance;
            (input.actor_location, end, config.radius)
        }
        TraceMode::LineCastActorTransform => {
            let end = input.actor_location + input.facing * config.distance;
            (input.actor_location, end, 0.0)
        }
    };

    let hit = world.cast_shape(origin, end, radius, Some(input.player));

    #[cfg(feature = "debug-tracing")]
    tracing::trace!(player = %input.player, ?origin, ?end, ?hit, "interaction probe");
    if config.display_trace {
        tracing::debug!(player = %input.player, ?origin, ?end, hit = ?hit.actor, "interaction probe");
    }

    process_hit(input, &hit, true, pull_speed_sq_threshold, world)
}

/// Probe straight at `location` (AI pulls). Never highlights.
pub fn resolve_at_location<Q: SpatialQuery>(
    input: &ResolverInput,
    location: Vec3,
    pull_speed_sq_threshold: f32,
    world: &Q,
) -> TargetUpdate {
    if input.stunned || !input.state.is_scanning() {
        return TargetUpdate::unchanged(input.current_target);
    }
    let hit = world.cast_shape(input.actor_location, location, 0.0, Some(input.player));
    process_hit(input, &hit, false, pull_speed_sq_threshold, world)
}

fn process_hit<Q: SpatialQuery>(
    input: &ResolverInput,
    hit: &HitResult,
    highlight: bool,
    pull_speed_sq_threshold: f32,
    world: &Q,
) -> TargetUpdate {
    let mut update = TargetUpdate::unchanged(input.current_target);
    let candidate = hit.interactable().filter(|id| world.is_idle_interactable(*id));

    // Drop the old target if the probe moved off it
    if candidate.is_none() || candidate != input.current_target {
        if highlight {
            update.unhighlight = input.current_target;
        }
        update.target = None;
    }

    let Some(object) = candidate else {
        return update;
    };

    if update.target != Some(object) {
        update.target = Some(object);
        if highlight {
            update.highlight = Some(object);
        }
    }

    if input.state == ThrowState::RequestingPull && input.speed_squared < pull_speed_sq_threshold {
        update.auto_pull = Some(object);
        update.target = None;
        if highlight {
            update.highlight = None;
            if input.current_target == Some(object) {
                update.unhighlight = Some(object);
            }
        }
    }

    update
}

// =============================================================================
// TESTS
// =============================================================================
