//! Built-in primitive actions.
//!
//! Most primitives wrap a single [`MotorCommand`]: `init` issues it, and
//! `check_if_done` only polls the sink, so repeated polls never re-issue the
//! command.  Helper constructors return ready-to-queue [`Action`]s.

use std::f32::consts::FRAC_PI_2;

use botcore_types::{
    ActionResult, CommandId, FailureKind, LiftTarget, MotorCommand, ObjectHandle, ObjectId, Pose,
    TrackSet,
};
use tracing::debug;

use crate::action::{Action, Primitive};
use crate::context::{ActionContext, WorldView};

/// Distance from an object's centre to its approach poses.
pub const APPROACH_DISTANCE_MM: f32 = 90.0;

// ─────────────────────────────────────────────────────────────────────────────
// CommandAction
// ─────────────────────────────────────────────────────────────────────────────

/// Issues one motor command and waits for it.
pub struct CommandAction {
    command: MotorCommand,
    tracks: TrackSet,
    issued: Option<CommandId>,
}

impl CommandAction {
    pub fn new(command: MotorCommand) -> Self {
        let tracks = command.default_tracks();
        Self {
            command,
            tracks,
            issued: None,
        }
    }

    /// Override the tracks claimed, e.g. an animation that leaves the body
    /// free.
    pub fn with_tracks(mut self, tracks: TrackSet) -> Self {
        self.tracks = tracks;
        self
    }

    pub fn command(&self) -> &MotorCommand {
        &self.command
    }
}

impl Primitive for CommandAction {
    fn name(&self) -> &str {
        self.command.label()
    }

    fn tracks(&self) -> TrackSet {
        self.tracks
    }

    fn init(&mut self, ctx: &mut ActionContext<'_>) -> ActionResult {
        self.issued = Some(ctx.commands.issue(self.command.clone()));
        ActionResult::Running
    }

    fn check_if_done(&mut self, ctx: &mut ActionContext<'_>) -> ActionResult {
        match self.issued {
            Some(id) => ctx.commands.poll(id),
            None => ActionResult::ABORT,
        }
    }

    fn on_cancel(&mut self, ctx: &mut ActionContext<'_>) {
        if let Some(id) = self.issued.take() {
            ctx.commands.abort(id);
        }
    }
}

pub fn drive_straight(distance_mm: f32, speed_mmps: f32) -> Action {
    Action::from_primitive(CommandAction::new(MotorCommand::DriveStraight {
        distance_mm,
        speed_mmps,
        accel_mmps2: 200.0,
        decel_mmps2: 200.0,
    }))
}

pub fn turn_in_place(angle_rad: f32, speed_radps: f32) -> Action {
    Action::from_primitive(CommandAction::new(MotorCommand::TurnInPlace {
        angle_rad,
        speed_radps,
    }))
}

pub fn drive_to_pose(pose: Pose) -> Action {
    Action::from_primitive(CommandAction::new(MotorCommand::DriveToPose { pose }))
}

pub fn move_lift(target: LiftTarget) -> Action {
    Action::from_primitive(CommandAction::new(MotorCommand::MoveLiftToHeight { target }))
}

pub fn move_head(angle_rad: f32) -> Action {
    Action::from_primitive(CommandAction::new(MotorCommand::MoveHeadToAngle { angle_rad }))
}

/// Plays an animation on every track.
pub fn play_animation(trigger: &str) -> Action {
    Action::from_primitive(CommandAction::new(MotorCommand::PlayAnimation {
        trigger: trigger.to_string(),
    }))
    .named(format!("play_animation:{trigger}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// WaitTicks
// ─────────────────────────────────────────────────────────────────────────────

/// Succeeds after a number of control-loop ticks.  Claims no tracks.
pub struct WaitTicks {
    ticks: u64,
    started_at: u64,
}

impl Primitive for WaitTicks {
    fn name(&self) -> &str {
        "wait"
    }

    fn tracks(&self) -> TrackSet {
        TrackSet::EMPTY
    }

    fn init(&mut self, ctx: &mut ActionContext<'_>) -> ActionResult {
        self.started_at = ctx.tick;
        ActionResult::Running
    }

    fn check_if_done(&mut self, ctx: &mut ActionContext<'_>) -> ActionResult {
        if ctx.tick.saturating_sub(self.started_at) >= self.ticks {
            ActionResult::Success
        } else {
            ActionResult::Running
        }
    }
}

pub fn wait_ticks(ticks: u64) -> Action {
    Action::from_primitive(WaitTicks {
        ticks,
        started_at: 0,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Object interaction
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    PickUp,
    PlaceOn,
    Flip,
}

impl Interaction {
    fn command(self, object: ObjectId) -> MotorCommand {
        match self {
            Interaction::PickUp => MotorCommand::PickUpObject { object },
            Interaction::PlaceOn => MotorCommand::PlaceOnObject { object },
            Interaction::Flip => MotorCommand::FlipObject { object },
        }
    }
}

/// Picks up, places on or flips a located object from one of its approach
/// poses.
pub struct ObjectInteraction {
    object: ObjectId,
    interaction: Interaction,
    inner: Option<CommandAction>,
}

impl ObjectInteraction {
    pub fn new(object: ObjectId, interaction: Interaction) -> Self {
        Self {
            object,
            interaction,
            inner: None,
        }
    }
}

impl Primitive for ObjectInteraction {
    fn name(&self) -> &str {
        match self.interaction {
            Interaction::PickUp => "pick_up_object",
            Interaction::PlaceOn => "place_on_object",
            Interaction::Flip => "flip_object",
        }
    }

    fn tracks(&self) -> TrackSet {
        self.interaction.command(self.object).default_tracks()
    }

    fn init(&mut self, ctx: &mut ActionContext<'_>) -> ActionResult {
        if ctx.world.located_object(self.object).is_none() {
            debug!(object = %self.object, "interaction target not located");
            return ActionResult::Failure(FailureKind::BadTarget);
        }
        let mut inner = CommandAction::new(self.interaction.command(self.object));
        let result = inner.init(ctx);
        self.inner = Some(inner);
        result
    }

    fn check_if_done(&mut self, ctx: &mut ActionContext<'_>) -> ActionResult {
        match self.inner.as_mut() {
            Some(inner) => inner.check_if_done(ctx),
            None => ActionResult::ABORT,
        }
    }

    fn on_cancel(&mut self, ctx: &mut ActionContext<'_>) {
        if let Some(inner) = self.inner.as_mut() {
            inner.on_cancel(ctx);
        }
    }

    fn precondition_poses(&self, world: &dyn WorldView) -> Vec<Pose> {
        world
            .located_object(self.object)
            .map(|handle| approach_poses(&handle, APPROACH_DISTANCE_MM).to_vec())
            .unwrap_or_default()
    }
}

pub fn pick_up(object: ObjectId) -> Action {
    Action::from_primitive(ObjectInteraction::new(object, Interaction::PickUp))
        .check_precondition_pose(true)
}

pub fn place_on(object: ObjectId) -> Action {
    Action::from_primitive(ObjectInteraction::new(object, Interaction::PlaceOn))
        .check_precondition_pose(true)
}

pub fn flip(object: ObjectId) -> Action {
    Action::from_primitive(ObjectInteraction::new(object, Interaction::Flip))
        .check_precondition_pose(true)
}

/// The four poses facing each side of `object`, `distance_mm` from its
/// centre, in the object's frame.
pub fn approach_poses(object: &ObjectHandle, distance_mm: f32) -> [Pose; 4] {
    std::array::from_fn(|side| {
        let heading = object.pose.angle_rad + side as f32 * FRAC_PI_2;
        Pose {
            frame: object.pose.frame,
            x_mm: object.pose.x_mm - distance_mm * heading.cos(),
            y_mm: object.pose.y_mm - distance_mm * heading.sin(),
            z_mm: 0.0,
            angle_rad: heading,
        }
    })
}
