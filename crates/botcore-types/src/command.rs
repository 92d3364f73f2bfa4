//! Motor and animation commands issued by primitive actions.
//!
//! The scheduler never interprets these; it hands them to the host's command
//! sink and polls for an [`ActionResult`][crate::ActionResult].

use serde::{Deserialize, Serialize};

use crate::track::{Track, TrackSet};
use crate::world::{ObjectId, Pose};

/// Handle to a command in flight, issued by the command sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub u64);

/// Named lift heights, or an explicit height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiftTarget {
    Low,
    Carry,
    High,
    HeightMm(f32),
}

impl LiftTarget {
    pub fn height_mm(self) -> f32 {
        match self {
            LiftTarget::Low => 32.0,
            LiftTarget::Carry => 75.0,
            LiftTarget::High => 92.0,
            LiftTarget::HeightMm(mm) => mm,
        }
    }
}

/// A physical command for the motor / animation subsystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload", rename_all = "snake_case")]
pub enum MotorCommand {
    DriveStraight {
        distance_mm: f32,
        speed_mmps: f32,
        accel_mmps2: f32,
        decel_mmps2: f32,
    },
    TurnInPlace {
        angle_rad: f32,
        speed_radps: f32,
    },
    DriveToPose {
        pose: Pose,
    },
    MoveLiftToHeight {
        target: LiftTarget,
    },
    MoveHeadToAngle {
        angle_rad: f32,
    },
    PlayAnimation {
        trigger: String,
    },
    PickUpObject {
        object: ObjectId,
    },
    PlaceOnObject {
        object: ObjectId,
    },
    FlipObject {
        object: ObjectId,
    },
}

impl MotorCommand {
    /// Tracks a command moves by default.
    ///
    /// Animations may drive every channel, so they claim [`TrackSet::ALL`]
    /// unless the issuing action narrows them.
    pub fn default_tracks(&self) -> TrackSet {
        match self {
            MotorCommand::DriveStraight { .. }
            | MotorCommand::TurnInPlace { .. }
            | MotorCommand::DriveToPose { .. } => Track::Body.into(),
            MotorCommand::MoveLiftToHeight { .. } => Track::Lift.into(),
            MotorCommand::MoveHeadToAngle { .. } => Track::Head.into(),
            MotorCommand::PlayAnimation { .. } => TrackSet::ALL,
            MotorCommand::PickUpObject { .. }
            | MotorCommand::PlaceOnObject { .. }
            | MotorCommand::FlipObject { .. } => Track::Body | Track::Head | Track::Lift,
        }
    }

    /// Short label used in logs and action names.
    pub fn label(&self) -> &'static str {
        match self {
            MotorCommand::DriveStraight { .. } => "drive_straight",
            MotorCommand::TurnInPlace { .. } => "turn_in_place",
            MotorCommand::DriveToPose { .. } => "drive_to_pose",
            MotorCommand::MoveLiftToHeight { .. } => "move_lift",
            MotorCommand::MoveHeadToAngle { .. } => "move_head",
            MotorCommand::PlayAnimation { .. } => "play_animation",
            MotorCommand::PickUpObject { .. } => "pick_up_object",
            MotorCommand::PlaceOnObject { .. } => "place_on_object",
            MotorCommand::FlipObject { .. } => "flip_object",
        }
    }
}
