//! Stock behaviors.
//!
//! | Behavior | Default priority | Runs when |
//! |----------|------------------|-----------|
//! | [`ReactToCubeMoved`] | 0 | a block was nudged (reflex, suppressible) |
//! | [`AdmireStack`] | 1 | the whiteboard names a stack that still stands |
//! | [`FlipBlock`] | 2 | a block lies on its side and has not just failed |
//! | [`StackBlocks`] | 3 | two free upright blocks are located |
//! | [`LookAround`] | 4 | always (idle fallback) |
//!
//! [`register_stock`] builds them from per-behavior [`BehaviorConfig`]s and
//! registers them in priority order.

mod admire_stack;
mod flip_block;
mod look_around;
mod react_to_cube_moved;
mod stack_blocks;

use std::collections::BTreeMap;

use botcore_actions::WorldView;
use botcore_types::{BehaviorConfig, BehaviorId, CoreError, ObjectId, Pose};
use tracing::warn;

pub use admire_stack::{AdmireStack, AdmireStackState};
pub use flip_block::{FlipBlock, drive_and_flip_block};
pub use look_around::LookAround;
pub use react_to_cube_moved::ReactToCubeMoved;
pub use stack_blocks::{StackBlocks, StackBlocksState};

use crate::arbiter::BehaviorArbiter;
use crate::behavior::{Behavior, BehaviorContext, BehaviorError};

/// Stock behavior names, highest priority first.
pub const STOCK_BEHAVIORS: [&str; 5] = [
    ReactToCubeMoved::NAME,
    AdmireStack::NAME,
    FlipBlock::NAME,
    StackBlocks::NAME,
    LookAround::NAME,
];

/// Height tolerance used when asking whether one block rests on another.
pub(crate) const STACK_TOLERANCE_MM: f32 = 15.0;

/// Register the stock behaviors.
///
/// `priorities` lists behavior names, highest priority first; an empty list
/// means [`STOCK_BEHAVIORS`].  Behaviors not listed are not registered.
pub fn register_stock(
    arbiter: &mut BehaviorArbiter,
    priorities: &[String],
    configs: &BTreeMap<String, BehaviorConfig>,
) -> Result<Vec<BehaviorId>, CoreError> {
    let default_order: Vec<String> = STOCK_BEHAVIORS.iter().map(|s| s.to_string()).collect();
    let order = if priorities.is_empty() {
        &default_order[..]
    } else {
        priorities
    };

    let empty = BehaviorConfig::default();
    let mut ids = Vec::with_capacity(order.len());
    for (priority, name) in (0u32..).zip(order) {
        let config = configs.get(name).unwrap_or(&empty);
        let id = match name.as_str() {
            ReactToCubeMoved::NAME => arbiter.register(ReactToCubeMoved::from_config(config), priority)?,
            AdmireStack::NAME => arbiter.register(AdmireStack::from_config(config), priority)?,
            FlipBlock::NAME => arbiter.register(FlipBlock::from_config(config)?, priority)?,
            StackBlocks::NAME => arbiter.register(StackBlocks::from_config(config), priority)?,
            LookAround::NAME => arbiter.register(LookAround::from_config(config), priority)?,
            other => return Err(CoreError::UnknownBehavior(other.to_string())),
        };
        ids.push(id);
    }
    Ok(ids)
}

// -----------------------------------------------------------------------------
// Helpers shared by the stock behaviors
// -----------------------------------------------------------------------------

/// End the behavior when a follow-up action could not be queued from a
/// continuation.
pub(crate) fn end_on_error<B: Behavior, T>(
    ctx: &mut BehaviorContext<'_, B>,
    queued: Result<T, BehaviorError>,
) {
    if let Err(err) = queued {
        warn!(behavior = %ctx.name(), %err, "could not queue follow-up action");
        ctx.end();
    }
}

/// Heading change that turns the robot to face `target`.
pub(crate) fn bearing_to(robot: &Pose, target: &Pose) -> Option<f32> {
    if robot.frame != target.frame {
        return None;
    }
    let heading = (target.y_mm - robot.y_mm).atan2(target.x_mm - robot.x_mm);
    let mut turn = heading - robot.angle_rad;
    while turn > std::f32::consts::PI {
        turn -= std::f32::consts::TAU;
    }
    while turn < -std::f32::consts::PI {
        turn += std::f32::consts::TAU;
    }
    Some(turn)
}

/// Where to remember a failure against `object`: its last pose, else the
/// robot's.
pub(crate) fn failure_pose(world: &dyn WorldView, object: ObjectId) -> Pose {
    world.pose_of(object).unwrap_or_else(|| world.robot_pose())
}

/// `true` when `id` has nothing on top and sits on nothing.
pub(crate) fn is_free(world: &dyn WorldView, id: ObjectId) -> bool {
    if world.object_on_top_of(id, STACK_TOLERANCE_MM).is_some() {
        return false;
    }
    !world
        .located_objects()
        .iter()
        .any(|o| o.id != id && world.object_on_top_of(o.id, STACK_TOLERANCE_MM).is_some_and(|t| t.id == id))
}
