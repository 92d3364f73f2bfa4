use botcore_actions::primitives::{flip, play_animation};
use botcore_actions::{Action, CompoundAction, RetryDecision, RetryWrapper, WorldView};
use botcore_kernel::{EntryKey, EntryScope, EntryValue, ObjectUse, Whiteboard};
use botcore_types::{ActionResult, BehaviorConfig, CoreError, FailureKind, ObjectId, ObjectOrientation};
use tracing::{debug, info, warn};

use super::failure_pose;
use crate::behavior::{Behavior, BehaviorContext, BehaviorError};
use crate::pose_selection::{DriveToApproachPose, FacePreference};

/// Drive to the chosen approach pose of `object`, then flip it.
///
/// The flip checks the robot's pose first and asks for a retry when the
/// drive fell short.
pub fn drive_and_flip_block(object: ObjectId, preference: FacePreference) -> Action {
    CompoundAction::sequential(vec![
        Action::from_primitive(DriveToApproachPose::new(object, preference)),
        flip(object),
    ])
    .into_action("drive_and_flip_block")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlipBlockState {
    Flipping,
}

/// Rights blocks lying on their side or upside down.
pub struct FlipBlock {
    max_retries: u32,
    failure_window_ticks: u64,
    preference: FacePreference,
    failure_animation: String,
    candidate: Option<ObjectId>,
}

impl FlipBlock {
    pub const NAME: &'static str = "flip_block";

    pub fn from_config(config: &BehaviorConfig) -> Result<Self, CoreError> {
        let preference = match config.str_or("face_preference", "closest") {
            "closest" => FacePreference::Closest,
            "farthest" => FacePreference::Farthest,
            _ => {
                return Err(CoreError::ConfigType {
                    key: "face_preference".into(),
                    expected: "\"closest\" or \"farthest\"",
                });
            }
        };
        Ok(Self {
            max_retries: config.u32_or("max_retries", 2),
            failure_window_ticks: u64::from(config.u32_or("failure_window_ticks", 200)),
            preference,
            failure_animation: config.str_or("failure_animation", "frustrated").to_string(),
            candidate: None,
        })
    }
}

impl Default for FlipBlock {
    fn default() -> Self {
        Self {
            max_retries: 2,
            failure_window_ticks: 200,
            preference: FacePreference::Closest,
            failure_animation: "frustrated".to_string(),
            candidate: None,
        }
    }
}

impl Behavior for FlipBlock {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn wants_to_run(&mut self, world: &dyn WorldView, whiteboard: &Whiteboard, tick: u64) -> bool {
        let stacked = whiteboard.stack_to_admire();
        let window = self.failure_window_ticks;
        self.candidate = world
            .located_objects()
            .into_iter()
            .filter(|o| o.orientation != ObjectOrientation::Upright)
            .map(|o| o.id)
            .filter(|&id| stacked.is_none_or(|s| s.top != id && s.bottom != id))
            .filter(|&id| !whiteboard.did_fail(ObjectUse::RollOrFlip, id, window, tick))
            .min();
        self.candidate.is_some()
    }

    fn on_activated(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> Result<(), BehaviorError> {
        let target = self
            .candidate
            .take()
            .ok_or_else(|| BehaviorError::NotReady("no block to flip".into()))?;
        let id = ctx.id();
        ctx.whiteboard_mut().set(
            id,
            EntryKey::TargetObject,
            EntryValue::Object(target),
            EntryScope::Activation,
        )?;
        ctx.set_state(FlipBlockState::Flipping);

        let start = ctx
            .world()
            .located_object(target)
            .map(|o| o.orientation)
            .ok_or_else(|| BehaviorError::NotReady(format!("{target} is no longer located")))?;

        let preference = self.preference;
        let action = RetryWrapper::new(self.max_retries, move || drive_and_flip_block(target, preference))
            .on_retry(move |attempt| {
                debug!(object = %target, attempt = attempt.attempt, "flip retry");
                RetryDecision::Retry { feedback: None }
            })
            .with_fallback(play_animation(&self.failure_animation))
            .into_action("flip_block");

        // The fallback animation succeeds too, so the block itself says
        // whether the flip happened.
        ctx.start_acting_then(action, move |_this, result, ctx| {
            let flipped = ctx
                .world()
                .located_object(target)
                .is_some_and(|o| o.orientation != start);
            if result == ActionResult::Success && flipped {
                info!(object = %target, "block flipped");
                ctx.objective_achieved("flipped_block", 1);
                return;
            }
            match result {
                ActionResult::Failure(FailureKind::NoPoseFound | FailureKind::BadTarget) => {
                    debug!(object = %target, %result, "block cannot be flipped");
                }
                _ => warn!(object = %target, %result, "gave up flipping block"),
            }
            let pose = failure_pose(ctx.world(), target);
            let tick = ctx.tick();
            ctx.whiteboard_mut()
                .record_failure(ObjectUse::RollOrFlip, target, pose, tick);
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use botcore_types::{MotorCommand, ObjectHandle, Pose};

    use super::*;
    use crate::testing::Harness;

    fn block(id: u32, x: f32, y: f32, orientation: ObjectOrientation) -> ObjectHandle {
        ObjectHandle {
            id: ObjectId(id),
            pose: Pose::new(x, y, 0.0),
            orientation,
        }
    }

    #[test]
    fn rejects_unknown_face_preference() {
        let config = BehaviorConfig::default().with("face_preference", "sideways");
        assert!(FlipBlock::from_config(&config).is_err());
    }

    #[test]
    fn flips_the_block_on_its_side() {
        let mut h = Harness::new(1);
        h.world.objects.push(block(1, 0.0, 0.0, ObjectOrientation::Upright));
        h.world.objects.push(block(2, 300.0, 0.0, ObjectOrientation::OnSide));
        h.arbiter.register(FlipBlock::default(), 0).unwrap();

        assert!(h.run_until(20, |h| h.arbiter.ledger().count("flipped_block") == 1));
        assert!(h.sink.issued.iter().any(|c| matches!(c, MotorCommand::FlipObject { object } if *object == ObjectId(2))));
        assert!(!h.sink.issued.iter().any(|c| matches!(c, MotorCommand::FlipObject { object } if *object == ObjectId(1))));
    }

    #[test]
    fn unreachable_block_is_skipped_after_failure() {
        let mut h = Harness::new(1);
        h.world.objects.push(block(1, 0.0, 0.0, ObjectOrientation::OnSide));
        for (i, (x, y)) in [(-90.0, 0.0), (90.0, 0.0), (0.0, 90.0), (0.0, -90.0)]
            .into_iter()
            .enumerate()
        {
            h.world.objects.push(block(10 + i as u32, x, y, ObjectOrientation::Upright));
        }
        let id = h.arbiter.register(FlipBlock::default(), 0).unwrap();

        assert!(h.run_until(10, |h| h.arbiter.whiteboard().failures(ObjectUse::RollOrFlip).count() == 1));
        // Once remembered, the boxed-in block no longer makes the behavior eligible.
        for _ in 0..5 {
            h.step();
        }
        assert_ne!(h.arbiter.active(), Some(id));
        assert!(h.sink.issued.is_empty());
    }

    #[test]
    fn exhausted_retries_play_failure_animation_and_remember_the_block() {
        let mut h = Harness::new(1);
        h.world.objects.push(block(1, 300.0, 0.0, ObjectOrientation::OnSide));
        let id = h.arbiter.register(FlipBlock::default(), 0).unwrap();

        // The robot keeps getting pushed away, so every flip finds it off-pose.
        let pushed_away = Pose::new(-500.0, -500.0, 0.0);
        let drives = |h: &Harness| {
            h.sink
                .issued
                .iter()
                .filter(|c| matches!(c, MotorCommand::DriveToPose { .. }))
                .count()
        };
        let mut remembered = false;
        for _ in 0..60 {
            h.step();
            h.world.robot = Some(pushed_away);
            if h.arbiter.whiteboard().failures(ObjectUse::RollOrFlip).count() == 1 {
                remembered = true;
                break;
            }
        }
        assert!(remembered);
        assert_eq!(drives(&h), 3);
        assert!(!h.sink.issued.iter().any(|c| matches!(c, MotorCommand::FlipObject { .. })));
        assert!(h.sink.issued.iter().any(
            |c| matches!(c, MotorCommand::PlayAnimation { trigger } if trigger == "frustrated")
        ));

        for _ in 0..20 {
            h.step();
            h.world.robot = Some(pushed_away);
        }
        assert_eq!(drives(&h), 3);
        assert_ne!(h.arbiter.active(), Some(id));
    }
}
