//! Looks at a freshly built stack, reacts if a third block lands on it and
//! finally knocks it over.
//!
//! ```text
//! LookingAtStack ──▶ WatchingStack ──(watch time up)──────────▶ KnockingOverStack
//!                        │                                           ▲
//!                        └─(third block stacked)─▶ ReactingToThirdBlock
//! ```
//!
//! The stack comes from the whiteboard entry written by
//! [`StackBlocks`][super::StackBlocks]; this behavior adopts the entry and
//! clears it once the stack is knocked over or gone.

use botcore_actions::primitives::{drive_straight, move_head, play_animation, turn_in_place, wait_ticks};
use botcore_actions::{
    Action, ActionContext, CompoundAction, Primitive, RetryDecision, RetryWrapper, WorldView,
};
use botcore_kernel::{EntryKey, StackToAdmire, Whiteboard};
use botcore_types::{
    ActionResult, BehaviorConfig, Event, EventPayload, EventTag, FailureKind, ObjectId,
    ReactionTrigger, TrackSet,
};
use tracing::{debug, info, warn};

use super::{STACK_TOLERANCE_MM, bearing_to, end_on_error};
use crate::behavior::{Behavior, BehaviorContext, BehaviorError, BehaviorStatus, EventSubscriptions};
use crate::pose_selection::{DriveToApproachPose, FacePreference};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmireStackState {
    LookingAtStack,
    WatchingStack,
    ReactingToThirdBlock,
    KnockingOverStack,
}

/// Fails with `Failure(Retry)` while `top` still rests on `bottom`.
struct StackToppled {
    stack: StackToAdmire,
}

impl Primitive for StackToppled {
    fn name(&self) -> &str {
        "check_stack_toppled"
    }

    fn tracks(&self) -> TrackSet {
        TrackSet::EMPTY
    }

    fn init(&mut self, ctx: &mut ActionContext<'_>) -> ActionResult {
        if still_standing(ctx.world, self.stack) {
            ActionResult::Failure(FailureKind::Retry)
        } else {
            ActionResult::Success
        }
    }

    fn check_if_done(&mut self, _ctx: &mut ActionContext<'_>) -> ActionResult {
        ActionResult::Success
    }
}

fn still_standing(world: &dyn WorldView, stack: StackToAdmire) -> bool {
    world
        .object_on_top_of(stack.bottom, STACK_TOLERANCE_MM)
        .is_some_and(|top| top.id == stack.top)
}

pub struct AdmireStack {
    watch_ticks: u64,
    knock_retries: u32,
    knock_distance_mm: f32,
    reaction_animation: String,
    failure_animation: String,
    stack: Option<StackToAdmire>,
    phase: AdmireStackState,
    third_block: Option<ObjectId>,
}

impl AdmireStack {
    pub const NAME: &'static str = "admire_stack";

    pub fn from_config(config: &BehaviorConfig) -> Self {
        Self {
            watch_ticks: u64::from(config.u32_or("watch_ticks", 10)),
            knock_retries: config.u32_or("knock_retries", 1),
            knock_distance_mm: config.f32_or("knock_distance_mm", 120.0),
            reaction_animation: config.str_or("reaction_animation", "surprised").to_string(),
            failure_animation: config.str_or("failure_animation", "frustrated").to_string(),
            stack: None,
            phase: AdmireStackState::LookingAtStack,
            third_block: None,
        }
    }

    fn enter(&mut self, ctx: &mut BehaviorContext<'_, Self>, phase: AdmireStackState) {
        self.phase = phase;
        ctx.set_state(phase);
    }

    fn look(&mut self, ctx: &mut BehaviorContext<'_, Self>, stack: StackToAdmire) -> Result<(), BehaviorError> {
        self.enter(ctx, AdmireStackState::LookingAtStack);
        let world = ctx.world();
        let turn = world
            .pose_of(stack.bottom)
            .and_then(|pose| bearing_to(&world.robot_pose(), &pose))
            .unwrap_or(0.0);
        let action = CompoundAction::parallel(vec![turn_in_place(turn, 2.0), move_head(0.3)])
            .into_action("look_at_stack");
        ctx.start_acting_then(action, |this, _result, ctx| {
            let queued = this.watch(ctx);
            end_on_error(ctx, queued);
        })?;
        Ok(())
    }

    fn watch(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> Result<(), BehaviorError> {
        self.enter(ctx, AdmireStackState::WatchingStack);
        ctx.start_acting_then(wait_ticks(self.watch_ticks), |this, result, ctx| {
            if result == ActionResult::Success {
                let queued = this.knock_over(ctx);
                end_on_error(ctx, queued);
            }
        })?;
        Ok(())
    }

    fn react_to_third_block(&mut self, ctx: &mut BehaviorContext<'_, Self>, block: ObjectId) -> Result<(), BehaviorError> {
        info!(%block, "third block on the stack");
        if !ctx.stop_acting() {
            debug!(%block, "nothing to interrupt for the third block");
        }
        self.enter(ctx, AdmireStackState::ReactingToThirdBlock);
        ctx.start_acting_then(play_animation(&self.reaction_animation), |this, _result, ctx| {
            let queued = this.knock_over(ctx);
            end_on_error(ctx, queued);
        })?;
        Ok(())
    }

    fn knock_over(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> Result<(), BehaviorError> {
        let stack = self
            .stack
            .ok_or_else(|| BehaviorError::NotReady("no stack".into()))?;
        self.enter(ctx, AdmireStackState::KnockingOverStack);
        let distance = self.knock_distance_mm;
        let action = RetryWrapper::new(self.knock_retries, move || {
            CompoundAction::sequential(vec![
                Action::from_primitive(DriveToApproachPose::new(stack.bottom, FacePreference::Farthest)),
                drive_straight(distance, 150.0),
                Action::from_primitive(StackToppled { stack }),
            ])
            .into_action("knock_over_stack")
        })
        .on_retry(|attempt| {
            debug!(attempt = attempt.attempt, "stack still standing");
            RetryDecision::Retry {
                feedback: Some(drive_straight(-60.0, 100.0)),
            }
        })
        .with_fallback(play_animation(&self.failure_animation))
        .into_action("knock_over_stack_with_retries");

        ctx.start_acting_then(action, move |this, _result, ctx| {
            if still_standing(ctx.world(), stack) {
                warn!(bottom = %stack.bottom, top = %stack.top, "gave up on the stack");
            } else {
                ctx.objective_achieved("knocked_over_stack", 2);
            }
            this.forget_stack(ctx);
            ctx.end();
        })?;
        Ok(())
    }

    fn forget_stack(&mut self, ctx: &mut BehaviorContext<'_, Self>) {
        self.stack = None;
        let id = ctx.id();
        if let Err(err) = ctx.whiteboard_mut().clear(id, EntryKey::StackToAdmire) {
            warn!(%err, "could not clear stack entry");
        }
    }
}

impl Default for AdmireStack {
    fn default() -> Self {
        Self::from_config(&BehaviorConfig::default())
    }
}

impl Behavior for AdmireStack {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn subscriptions(&self) -> EventSubscriptions {
        EventSubscriptions::while_running([EventTag::ObjectStacked])
    }

    fn handle_event(&mut self, event: &Event, _world: &dyn WorldView, running: bool) {
        if !running || self.phase != AdmireStackState::WatchingStack {
            return;
        }
        if let (EventPayload::ObjectStacked { top, bottom }, Some(stack)) = (&event.payload, self.stack) {
            if *bottom == stack.top {
                self.third_block = Some(*top);
            }
        }
    }

    fn wants_to_run(&mut self, world: &dyn WorldView, whiteboard: &Whiteboard, _tick: u64) -> bool {
        self.stack = whiteboard
            .stack_to_admire()
            .filter(|&stack| still_standing(world, stack));
        self.stack.is_some()
    }

    fn on_activated(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> Result<(), BehaviorError> {
        let stack = self
            .stack
            .ok_or_else(|| BehaviorError::NotReady("stack is gone".into()))?;
        self.third_block = None;
        let id = ctx.id();
        ctx.whiteboard_mut().adopt(id, EntryKey::StackToAdmire)?;
        ctx.disable_reactions(&[ReactionTrigger::ObjectPositionUpdated, ReactionTrigger::CubeMoved])?;
        self.look(ctx, stack)
    }

    fn update(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> BehaviorStatus {
        let Some(stack) = self.stack else {
            return BehaviorStatus::Complete;
        };
        if self.phase != AdmireStackState::KnockingOverStack && !still_standing(ctx.world(), stack) {
            info!(bottom = %stack.bottom, "stack fell before we got to it");
            self.forget_stack(ctx);
            return BehaviorStatus::Complete;
        }
        if let Some(block) = self.third_block.take() {
            if let Err(err) = self.react_to_third_block(ctx, block) {
                warn!(%err, "could not react to third block");
                return BehaviorStatus::Complete;
            }
        }
        if ctx.is_acting() {
            BehaviorStatus::Running
        } else {
            BehaviorStatus::Complete
        }
    }
}
