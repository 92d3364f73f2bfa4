use botcore_actions::primitives::{pick_up, place_on, play_animation};
use botcore_actions::{Action, CompoundAction, RetryDecision, RetryWrapper, WorldView};
use botcore_kernel::{EntryKey, EntryScope, EntryValue, ObjectUse, StackToAdmire, Whiteboard};
use botcore_types::{
    ActionResult, BehaviorConfig, FailureKind, ObjectId, ObjectOrientation, ReactionTrigger,
};
use tracing::{debug, info};

use super::{end_on_error, failure_pose, is_free};
use crate::behavior::{Behavior, BehaviorContext, BehaviorError};
use crate::pose_selection::{DriveToApproachPose, FacePreference};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackBlocksState {
    PickingUp,
    Placing,
    Celebrating,
}

/// Picks up one free block and puts it on another.
///
/// On success the stack is published on the whiteboard as a session entry
/// so [`AdmireStack`][super::AdmireStack] can pick it up.
pub struct StackBlocks {
    max_retries: u32,
    failure_window_ticks: u64,
    success_animation: String,
    candidate: Option<StackToAdmire>,
}

impl StackBlocks {
    pub const NAME: &'static str = "stack_blocks";

    pub fn from_config(config: &BehaviorConfig) -> Self {
        Self {
            max_retries: config.u32_or("max_retries", 2),
            failure_window_ticks: u64::from(config.u32_or("failure_window_ticks", 200)),
            success_animation: config.str_or("success_animation", "celebrate").to_string(),
            candidate: None,
        }
    }

    fn interact(&self, object: ObjectId, step: fn(ObjectId) -> Action, name: &'static str) -> Action {
        RetryWrapper::new(self.max_retries, move || {
            CompoundAction::sequential(vec![
                Action::from_primitive(DriveToApproachPose::new(object, FacePreference::Closest)),
                step(object),
            ])
            .into_action(format!("{name}_sequence"))
        })
        .on_retry(|attempt| {
            debug!(attempt = attempt.attempt, max_retries = attempt.max_retries, "stacking step retry");
            RetryDecision::Retry { feedback: None }
        })
        .into_action(name)
    }

    fn place(&mut self, ctx: &mut BehaviorContext<'_, Self>, stack: StackToAdmire) -> Result<(), BehaviorError> {
        ctx.set_state(StackBlocksState::Placing);
        let action = self.interact(stack.bottom, place_on, "place_on");
        ctx.start_acting_then(action, move |this, result, ctx| {
            if result != ActionResult::Success {
                this.note_failure(ctx, ObjectUse::StackOn, stack.bottom, result);
                ctx.end();
                return;
            }
            let queued = this.finish(ctx, stack);
            end_on_error(ctx, queued);
        })?;
        Ok(())
    }

    fn finish(&mut self, ctx: &mut BehaviorContext<'_, Self>, stack: StackToAdmire) -> Result<(), BehaviorError> {
        let id = ctx.id();
        ctx.whiteboard_mut().set(
            id,
            EntryKey::StackToAdmire,
            EntryValue::Stack(stack),
            EntryScope::Session,
        )?;
        info!(bottom = %stack.bottom, top = %stack.top, "stack built");
        ctx.objective_achieved("stacked_blocks", 1);
        ctx.set_state(StackBlocksState::Celebrating);
        ctx.start_acting(play_animation(&self.success_animation))?;
        Ok(())
    }

    fn note_failure(
        &self,
        ctx: &mut BehaviorContext<'_, Self>,
        use_: ObjectUse,
        object: ObjectId,
        result: ActionResult,
    ) {
        if matches!(
            result,
            ActionResult::Failure(FailureKind::NoPoseFound | FailureKind::BadTarget)
        ) {
            let pose = failure_pose(ctx.world(), object);
            let tick = ctx.tick();
            ctx.whiteboard_mut().record_failure(use_, object, pose, tick);
        }
    }
}

impl Default for StackBlocks {
    fn default() -> Self {
        Self::from_config(&BehaviorConfig::default())
    }
}

impl Behavior for StackBlocks {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn wants_to_run(&mut self, world: &dyn WorldView, whiteboard: &Whiteboard, tick: u64) -> bool {
        self.candidate = None;
        if whiteboard.stack_to_admire().is_some() {
            return false;
        }
        let window = self.failure_window_ticks;
        let mut free: Vec<ObjectId> = world
            .located_objects()
            .into_iter()
            .filter(|o| o.orientation == ObjectOrientation::Upright)
            .map(|o| o.id)
            .filter(|&id| is_free(world, id))
            .collect();
        free.sort();
        let top = free
            .iter()
            .copied()
            .find(|&id| !whiteboard.did_fail(ObjectUse::PickUp, id, window, tick));
        let bottom = free.iter().copied().find(|&id| {
            Some(id) != top && !whiteboard.did_fail(ObjectUse::StackOn, id, window, tick)
        });
        if let (Some(top), Some(bottom)) = (top, bottom) {
            self.candidate = Some(StackToAdmire { bottom, top });
        }
        self.candidate.is_some()
    }

    fn on_activated(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> Result<(), BehaviorError> {
        let stack = self
            .candidate
            .take()
            .ok_or_else(|| BehaviorError::NotReady("no free blocks".into()))?;
        // Moving blocks ourselves must not trip the cube-moved reflex.
        ctx.disable_reactions(&[ReactionTrigger::CubeMoved])?;
        let id = ctx.id();
        ctx.whiteboard_mut().set(
            id,
            EntryKey::TargetObject,
            EntryValue::Object(stack.top),
            EntryScope::Activation,
        )?;

        ctx.set_state(StackBlocksState::PickingUp);
        let action = self.interact(stack.top, pick_up, "pick_up");
        ctx.start_acting_then(action, move |this, result, ctx| {
            if result != ActionResult::Success {
                this.note_failure(ctx, ObjectUse::PickUp, stack.top, result);
                ctx.end();
                return;
            }
            let queued = this.place(ctx, stack);
            end_on_error(ctx, queued);
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use botcore_types::{MotorCommand, ObjectHandle, Pose};

    use super::*;
    use crate::testing::Harness;

    fn upright(id: u32, x: f32) -> ObjectHandle {
        ObjectHandle {
            id: ObjectId(id),
            pose: Pose::new(x, 0.0, 0.0),
            orientation: ObjectOrientation::Upright,
        }
    }

    #[test]
    fn needs_two_free_upright_blocks() {
        let mut h = Harness::new(1);
        let mut behavior = StackBlocks::default();
        h.world.objects.push(upright(1, 0.0));
        assert!(!behavior.wants_to_run(&h.world, h.arbiter.whiteboard(), 1));

        h.world.objects.push(upright(2, 300.0));
        assert!(behavior.wants_to_run(&h.world, h.arbiter.whiteboard(), 1));
        assert_eq!(
            behavior.candidate,
            Some(StackToAdmire {
                bottom: ObjectId(2),
                top: ObjectId(1)
            })
        );
    }

    #[test]
    fn builds_a_stack_and_publishes_it() {
        let mut h = Harness::new(1);
        h.world.objects.push(upright(1, 0.0));
        h.world.objects.push(upright(2, 300.0));
        let id = h.arbiter.register(StackBlocks::default(), 0).unwrap();

        assert!(h.run_until(60, |h| h.arbiter.whiteboard().stack_to_admire().is_some()));
        assert_eq!(
            h.arbiter.whiteboard().stack_to_admire(),
            Some(StackToAdmire {
                bottom: ObjectId(2),
                top: ObjectId(1)
            })
        );
        assert_eq!(h.arbiter.whiteboard().owner_of(EntryKey::StackToAdmire), Some(id));
        assert_eq!(h.arbiter.ledger().count("stacked_blocks"), 1);
        assert!(h.sink.issued.iter().any(|c| matches!(c, MotorCommand::PickUpObject { object } if *object == ObjectId(1))));
        assert!(h.sink.issued.iter().any(|c| matches!(c, MotorCommand::PlaceOnObject { object } if *object == ObjectId(2))));
        // The reflex stays suppressed only while stacking.
        assert!(h.run_until(20, |h| h.arbiter.active().is_none()));
        assert!(!h.arbiter.reaction_locks().is_suppressed(ReactionTrigger::CubeMoved));
        // The session entry survives deactivation.
        assert!(h.arbiter.whiteboard().stack_to_admire().is_some());
    }

    #[test]
    fn unreachable_block_is_remembered() {
        let mut h = Harness::new(1);
        h.world.objects.push(upright(1, 0.0));
        h.world.objects.push(upright(2, 300.0));
        // Box block 1 in on every side.
        for (i, (x, y)) in [(-90.0, 0.0), (90.0, 0.0), (0.0, 90.0), (0.0, -90.0)]
            .into_iter()
            .enumerate()
        {
            let mut o = upright(10 + i as u32, x);
            o.pose.y_mm = y;
            o.orientation = ObjectOrientation::OnSide;
            h.world.objects.push(o);
        }
        h.arbiter.register(StackBlocks::default(), 0).unwrap();

        assert!(h.run_until(10, |h| h.arbiter.whiteboard().failures(ObjectUse::PickUp).count() > 0));
        let failure = h.arbiter.whiteboard().failures(ObjectUse::PickUp).next().copied();
        assert_eq!(failure.map(|f| f.object), Some(ObjectId(1)));
    }
}
