use botcore_actions::primitives::{play_animation, turn_in_place};
use botcore_actions::{CompoundAction, WorldView};
use botcore_kernel::Whiteboard;
use botcore_types::{BehaviorConfig, Event, EventPayload, EventTag, ObjectId, ReactionTrigger};
use tracing::debug;

use super::bearing_to;
use crate::behavior::{Behavior, BehaviorContext, BehaviorError, EventSubscriptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReactState {
    Reacting,
}

/// Reflex: turn toward a block someone nudged and play a short reaction.
///
/// Other behaviors silence it with
/// [`disable_reactions`][BehaviorContext::disable_reactions]`(&[ReactionTrigger::CubeMoved])`,
/// in which case the nudge is neither heard nor acted upon.
pub struct ReactToCubeMoved {
    animation: String,
    pending: Option<ObjectId>,
}

impl ReactToCubeMoved {
    pub const NAME: &'static str = "react_to_cube_moved";

    pub fn from_config(config: &BehaviorConfig) -> Self {
        Self {
            animation: config.str_or("animation", "cube_moved_reaction").to_string(),
            pending: None,
        }
    }
}

impl Default for ReactToCubeMoved {
    fn default() -> Self {
        Self::from_config(&BehaviorConfig::default())
    }
}

impl Behavior for ReactToCubeMoved {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn reaction_trigger(&self) -> Option<ReactionTrigger> {
        Some(ReactionTrigger::CubeMoved)
    }

    fn subscriptions(&self) -> EventSubscriptions {
        EventSubscriptions::default().and_always([EventTag::ObjectMoved])
    }

    fn handle_event(&mut self, event: &Event, _world: &dyn WorldView, running: bool) {
        if let EventPayload::ObjectMoved { object } = event.payload {
            if running {
                debug!(%object, "already reacting, nudge ignored");
            } else {
                self.pending = Some(object);
            }
        }
    }

    fn wants_to_run(&mut self, _world: &dyn WorldView, _whiteboard: &Whiteboard, _tick: u64) -> bool {
        self.pending.is_some()
    }

    fn on_activated(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> Result<(), BehaviorError> {
        let object = self
            .pending
            .take()
            .ok_or_else(|| BehaviorError::NotReady("nothing moved".into()))?;
        ctx.set_state(ReactState::Reacting);
        let world = ctx.world();
        let turn = world
            .pose_of(object)
            .and_then(|pose| bearing_to(&world.robot_pose(), &pose));
        let mut steps = Vec::with_capacity(2);
        if let Some(turn) = turn {
            steps.push(turn_in_place(turn, 3.0));
        }
        steps.push(play_animation(&self.animation));
        ctx.start_acting(CompoundAction::sequential(steps).into_action("react_to_cube_moved"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use botcore_types::{MotorCommand, ObjectHandle, ObjectOrientation, Pose};

    use super::*;
    use crate::testing::Harness;

    #[test]
    fn nudge_turns_toward_block_and_reacts() {
        let mut h = Harness::new(1);
        h.world.objects.push(ObjectHandle {
            id: ObjectId(4),
            pose: Pose::new(0.0, 200.0, 0.0),
            orientation: ObjectOrientation::Upright,
        });
        let id = h.arbiter.register(ReactToCubeMoved::default(), 0).unwrap();

        h.step();
        assert_eq!(h.arbiter.active(), None);

        h.publish(EventPayload::ObjectMoved { object: ObjectId(4) });
        h.step();
        assert_eq!(h.arbiter.active(), Some(id));
        assert!(matches!(
            h.sink.issued.first(),
            Some(MotorCommand::TurnInPlace { angle_rad, .. }) if (*angle_rad - std::f32::consts::FRAC_PI_2).abs() < 1e-4
        ));

        assert!(h.run_until(10, |h| h.arbiter.active().is_none()));
        assert_eq!(h.sink.issued.len(), 2);
    }
}
