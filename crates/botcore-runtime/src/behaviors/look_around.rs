use botcore_actions::primitives::{move_head, turn_in_place, wait_ticks};
use botcore_actions::{CompoundAction, WorldView};
use botcore_kernel::Whiteboard;
use botcore_types::{ActionResult, BehaviorConfig};

use super::end_on_error;
use crate::behavior::{Behavior, BehaviorContext, BehaviorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LookAroundState {
    Sweeping,
}

/// Idle fallback: sweeps the head and body back and forth.
pub struct LookAround {
    turn_rad: f32,
    head_angle_rad: f32,
    pause_ticks: u64,
    sweeps: u32,
    done: u32,
    direction: f32,
}

impl LookAround {
    pub const NAME: &'static str = "look_around";

    pub fn from_config(config: &BehaviorConfig) -> Self {
        Self {
            turn_rad: config.f32_or("turn_deg", 45.0).to_radians(),
            head_angle_rad: config.f32_or("head_angle_deg", 10.0).to_radians(),
            pause_ticks: u64::from(config.u32_or("pause_ticks", 3)),
            sweeps: config.u32_or("sweeps", 4).max(1),
            done: 0,
            direction: 1.0,
        }
    }

    fn sweep(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> Result<(), BehaviorError> {
        let action = CompoundAction::sequential(vec![
            move_head(self.head_angle_rad),
            turn_in_place(self.turn_rad * self.direction, 1.5),
            wait_ticks(self.pause_ticks),
        ])
        .into_action("look_around_sweep");
        self.direction = -self.direction;
        ctx.start_acting_then(action, |this, result, ctx| {
            this.done += 1;
            if result != ActionResult::Success || this.done >= this.sweeps {
                ctx.end();
                return;
            }
            let queued = this.sweep(ctx);
            end_on_error(ctx, queued);
        })?;
        Ok(())
    }
}

impl Default for LookAround {
    fn default() -> Self {
        Self::from_config(&BehaviorConfig::default())
    }
}

impl Behavior for LookAround {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn wants_to_run(&mut self, _world: &dyn WorldView, _whiteboard: &Whiteboard, _tick: u64) -> bool {
        true
    }

    fn on_activated(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> Result<(), BehaviorError> {
        self.done = 0;
        ctx.set_state(LookAroundState::Sweeping);
        self.sweep(ctx)
    }
}
