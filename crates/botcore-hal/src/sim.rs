//! Deterministic in-process robot for headless runs and tests.
//!
//! [`SimRobot`] owns a [`SimWorld`] (blocks, robot pose, the last observed
//! face) and [`SimMotors`] (the command sink).  Commands complete after a
//! fixed number of [`SimRobot::advance`] calls and only then change the
//! world, so behaviors see the same issue → poll → settle rhythm they would
//! see on hardware.
//!
//! # Command effects
//!
//! | Command | Effect on completion |
//! |---|---|
//! | `DriveStraight` | Robot moves along its heading.  A forward drive through a stack knocks the top block off. |
//! | `TurnInPlace` | Robot heading changes. |
//! | `DriveToPose` | Robot is placed at the pose; fails with `BadTarget` across frames. |
//! | `PickUpObject` | Block leaves the world view and rides in the lift. |
//! | `PlaceOnObject` | Carried block is set on the target; emits `ObjectStacked`. |
//! | `FlipObject` | Block rolls a quarter turn toward upright. |
//! | lift, head, animation | No world effect. |
//!
//! Interactions need the robot within [`SimConfig::reach_mm`] of the block
//! and fail with `Failure(Retry)` otherwise.
//!
//! # Example
//!
//! ```rust
//! use botcore_actions::{CommandSink, WorldView};
//! use botcore_hal::sim::SimRobot;
//! use botcore_types::{ActionResult, MotorCommand, ObjectId, ObjectOrientation, Pose};
//!
//! let mut robot = SimRobot::builder()
//!     .with_block(ObjectId(1), Pose::new(200.0, 0.0, 0.0), ObjectOrientation::Upright)
//!     .with_command_ticks(1)
//!     .build();
//!
//! let (_, motors) = robot.parts();
//! let id = motors.issue(MotorCommand::DriveStraight {
//!     distance_mm: 50.0,
//!     speed_mmps: 100.0,
//!     accel_mmps2: 200.0,
//!     decel_mmps2: 200.0,
//! });
//! robot.advance();
//!
//! let (world, motors) = robot.parts();
//! assert_eq!(motors.poll(id), ActionResult::Success);
//! assert!((world.robot_pose().x_mm - 50.0).abs() < 1e-3);
//! ```

use std::collections::BTreeMap;

use botcore_actions::{CommandSink, WorldView};
use botcore_types::{
    ActionResult, CommandId, Event, EventPayload, FaceObservation, FailureKind, FrameId,
    MotorCommand, ObjectHandle, ObjectId, ObjectOrientation, Pose,
};
use tracing::{debug, info};

/// Edge length of a block.
pub const BLOCK_SIZE_MM: f32 = 44.0;

const EVENT_SOURCE: &str = "botcore-hal::sim";

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Timing and geometry knobs of the simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    /// Advances a motion or interaction command takes to complete.
    pub command_ticks: u32,
    /// Advances an animation takes to complete.
    pub animation_ticks: u32,
    /// Farthest the robot can be from a block and still touch it.
    pub reach_mm: f32,
    /// How close a forward drive must pass to a stack to knock it over.
    pub contact_radius_mm: f32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            command_ticks: 3,
            animation_ticks: 6,
            reach_mm: 120.0,
            contact_radius_mm: 35.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// World
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct SimBlock {
    pose: Pose,
    orientation: ObjectOrientation,
}

/// The simulated world as behaviors see it.
#[derive(Debug, Clone)]
pub struct SimWorld {
    blocks: BTreeMap<ObjectId, SimBlock>,
    robot: Pose,
    face: Option<FaceObservation>,
    carried: Option<ObjectId>,
}

impl SimWorld {
    /// The block riding in the lift, if any.
    pub fn carried(&self) -> Option<ObjectId> {
        self.carried
    }

    fn block(&self, id: ObjectId) -> Option<&SimBlock> {
        if self.carried == Some(id) {
            return None;
        }
        self.blocks.get(&id)
    }

    fn within_reach(&self, id: ObjectId, reach_mm: f32) -> bool {
        self.block(id)
            .and_then(|b| self.robot.distance_to(&b.pose))
            .is_some_and(|d| d <= reach_mm)
    }

    fn top_of(&self, id: ObjectId, tolerance_mm: f32) -> Option<ObjectId> {
        let base = self.block(id)?.pose;
        self.blocks
            .iter()
            .filter(|(other, _)| **other != id && self.carried != Some(**other))
            .find(|(_, b)| {
                b.pose
                    .distance_to(&base)
                    .is_some_and(|d| d <= tolerance_mm)
                    && (b.pose.z_mm - (base.z_mm + BLOCK_SIZE_MM)).abs() <= tolerance_mm
            })
            .map(|(other, _)| *other)
    }
}

impl WorldView for SimWorld {
    fn located_object(&self, id: ObjectId) -> Option<ObjectHandle> {
        self.block(id).map(|b| ObjectHandle {
            id,
            pose: b.pose,
            orientation: b.orientation,
        })
    }

    fn last_observed_face(&self) -> Option<FaceObservation> {
        self.face
    }

    fn object_on_top_of(&self, id: ObjectId, tolerance_mm: f32) -> Option<ObjectHandle> {
        self.top_of(id, tolerance_mm)
            .and_then(|top| self.located_object(top))
    }

    fn robot_pose(&self) -> Pose {
        self.robot
    }

    fn located_objects(&self) -> Vec<ObjectHandle> {
        self.blocks
            .keys()
            .filter_map(|id| self.located_object(*id))
            .collect()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Motors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct InFlight {
    command: MotorCommand,
    remaining: u32,
}

/// The simulated command sink.
///
/// Issued commands stay `Running` until enough advances have passed; the
/// settled result is then reported on every poll.
#[derive(Debug, Clone, Default)]
pub struct SimMotors {
    command_ticks: u32,
    animation_ticks: u32,
    next_id: u64,
    in_flight: BTreeMap<CommandId, InFlight>,
    settled: BTreeMap<CommandId, ActionResult>,
    aborted: Vec<CommandId>,
    history: Vec<MotorCommand>,
}

impl SimMotors {
    /// Every command issued so far, oldest first.
    pub fn history(&self) -> &[MotorCommand] {
        &self.history
    }

    /// Number of commands still executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn duration(&self, command: &MotorCommand) -> u32 {
        match command {
            MotorCommand::PlayAnimation { .. } => self.animation_ticks,
            _ => self.command_ticks,
        }
        .max(1)
    }

    /// Count one advance down and return the commands that just finished.
    fn count_down(&mut self) -> Vec<(CommandId, MotorCommand)> {
        let mut finished = Vec::new();
        self.in_flight.retain(|id, flight| {
            flight.remaining = flight.remaining.saturating_sub(1);
            if flight.remaining == 0 {
                finished.push((*id, flight.command.clone()));
                false
            } else {
                true
            }
        });
        finished
    }
}

impl CommandSink for SimMotors {
    fn issue(&mut self, command: MotorCommand) -> CommandId {
        self.next_id += 1;
        let id = CommandId(self.next_id);
        debug!(command = command.label(), id = id.0, "sim command issued");
        let remaining = self.duration(&command);
        self.history.push(command.clone());
        self.in_flight.insert(id, InFlight { command, remaining });
        id
    }

    fn poll(&mut self, id: CommandId) -> ActionResult {
        if self.in_flight.contains_key(&id) {
            return ActionResult::Running;
        }
        self.settled.get(&id).copied().unwrap_or(ActionResult::ABORT)
    }

    fn abort(&mut self, id: CommandId) {
        if let Some(flight) = self.in_flight.remove(&id) {
            debug!(command = flight.command.label(), id = id.0, "sim command aborted");
            self.aborted.push(id);
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Robot
// ────────────────────────────────────────────────────────────────────────────

/// World and motors advanced together, plus the events they produced.
pub struct SimRobot {
    config: SimConfig,
    world: SimWorld,
    motors: SimMotors,
    events: Vec<Event>,
    ticks: u64,
}

impl SimRobot {
    pub fn builder() -> SimRobotBuilder {
        SimRobotBuilder::default()
    }

    /// Read-only world for behaviors and a mutable sink for their actions.
    pub fn parts(&mut self) -> (&SimWorld, &mut SimMotors) {
        (&self.world, &mut self.motors)
    }

    pub fn world(&self) -> &SimWorld {
        &self.world
    }

    pub fn motors(&self) -> &SimMotors {
        &self.motors
    }

    pub fn config(&self) -> SimConfig {
        self.config
    }

    /// Advances performed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Events produced since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Let one tick of simulated time pass.
    ///
    /// Finished commands apply their effects in issue order.  If anything was
    /// aborted while a block was in the lift, the block is set down in front
    /// of the robot.
    pub fn advance(&mut self) {
        self.ticks += 1;
        for (id, command) in self.motors.count_down() {
            let result = self.apply(&command);
            debug!(command = command.label(), id = id.0, %result, "sim command settled");
            self.motors.settled.insert(id, result);
        }
        if !self.motors.aborted.is_empty() {
            self.motors.aborted.clear();
            self.set_down_carried();
        }
    }

    /// Someone slides `object` by the given offset.
    ///
    /// Whatever sat on it falls off.  Unknown or carried objects are ignored.
    pub fn nudge(&mut self, object: ObjectId, dx_mm: f32, dy_mm: f32) {
        if self.world.carried == Some(object) {
            return;
        }
        let top = self.world.top_of(object, BLOCK_SIZE_MM / 2.0);
        let Some(block) = self.world.blocks.get_mut(&object) else {
            return;
        };
        block.pose.x_mm += dx_mm;
        block.pose.y_mm += dy_mm;
        let pose = block.pose;
        info!(%object, %pose, "block nudged");
        self.emit(EventPayload::ObjectMoved { object });
        if let Some(top) = top {
            let heading = dy_mm.atan2(dx_mm);
            self.topple(top, pose, heading);
        }
    }

    /// A face is seen at `pose`.
    pub fn observe_face(&mut self, pose: Pose) {
        self.world.face = Some(FaceObservation {
            observed_tick: self.ticks,
            pose,
        });
        self.emit(EventPayload::FaceObserved { pose });
    }

    /// The robot is lifted and set down at `pose` in a fresh frame.
    ///
    /// Blocks are re-observed in the new frame; the face stays in the old
    /// one until it is seen again.
    pub fn relocate(&mut self, pose: Pose) {
        let frame = FrameId(self.world.robot.frame.0 + 1);
        self.world.robot = pose.in_frame(frame);
        self.emit(EventPayload::RobotPickedUp);
        let ids: Vec<ObjectId> = self.world.blocks.keys().copied().collect();
        for object in ids {
            if let Some(block) = self.world.blocks.get_mut(&object) {
                block.pose = block.pose.in_frame(frame);
                let pose = block.pose;
                if self.world.carried != Some(object) {
                    self.emit(EventPayload::ObjectObserved { object, pose });
                }
            }
        }
        info!(frame = frame.0, "robot relocated");
    }

    // ------------------------------------------------------------------------
    // Command effects
    // ------------------------------------------------------------------------

    fn apply(&mut self, command: &MotorCommand) -> ActionResult {
        let reach = self.config.reach_mm;
        match command {
            MotorCommand::DriveStraight { distance_mm, .. } => {
                let start = self.world.robot;
                self.world.robot = start.advanced(*distance_mm);
                if *distance_mm > 0.0 {
                    self.knock_over_stacks(start, self.world.robot);
                }
                ActionResult::Success
            }
            MotorCommand::TurnInPlace { angle_rad, .. } => {
                self.world.robot.angle_rad += *angle_rad;
                ActionResult::Success
            }
            MotorCommand::DriveToPose { pose } => {
                if pose.frame != self.world.robot.frame {
                    return ActionResult::Failure(FailureKind::BadTarget);
                }
                self.world.robot = *pose;
                ActionResult::Success
            }
            MotorCommand::PickUpObject { object } => {
                if self.world.carried.is_some() || self.world.block(*object).is_none() {
                    return ActionResult::Failure(FailureKind::BadTarget);
                }
                if self.world.top_of(*object, BLOCK_SIZE_MM / 2.0).is_some() {
                    return ActionResult::Failure(FailureKind::BadTarget);
                }
                if !self.world.within_reach(*object, reach) {
                    return ActionResult::Failure(FailureKind::Retry);
                }
                self.world.carried = Some(*object);
                info!(%object, "block picked up");
                ActionResult::Success
            }
            MotorCommand::PlaceOnObject { object } => {
                let Some(carried) = self.world.carried else {
                    return ActionResult::Failure(FailureKind::BadTarget);
                };
                let Some(base) = self.world.block(*object).map(|b| b.pose) else {
                    return ActionResult::Failure(FailureKind::BadTarget);
                };
                if self.world.top_of(*object, BLOCK_SIZE_MM / 2.0).is_some() {
                    return ActionResult::Failure(FailureKind::BadTarget);
                }
                if !self.world.within_reach(*object, reach) {
                    return ActionResult::Failure(FailureKind::Retry);
                }
                let pose = base.at_height(base.z_mm + BLOCK_SIZE_MM);
                if let Some(block) = self.world.blocks.get_mut(&carried) {
                    block.pose = pose;
                    block.orientation = ObjectOrientation::Upright;
                }
                self.world.carried = None;
                info!(top = %carried, bottom = %object, "block stacked");
                self.emit(EventPayload::ObjectObserved { object: carried, pose });
                self.emit(EventPayload::ObjectStacked {
                    top: carried,
                    bottom: *object,
                });
                ActionResult::Success
            }
            MotorCommand::FlipObject { object } => {
                if self.world.block(*object).is_none() {
                    return ActionResult::Failure(FailureKind::BadTarget);
                }
                if !self.world.within_reach(*object, reach) {
                    return ActionResult::Failure(FailureKind::Retry);
                }
                let Some(block) = self.world.blocks.get_mut(object) else {
                    return ActionResult::Failure(FailureKind::BadTarget);
                };
                block.orientation = match block.orientation {
                    ObjectOrientation::UpsideDown => ObjectOrientation::OnSide,
                    _ => ObjectOrientation::Upright,
                };
                let pose = block.pose;
                info!(%object, orientation = ?block.orientation, "block rolled");
                self.emit(EventPayload::ObjectObserved {
                    object: *object,
                    pose,
                });
                ActionResult::Success
            }
            MotorCommand::MoveLiftToHeight { .. }
            | MotorCommand::MoveHeadToAngle { .. }
            | MotorCommand::PlayAnimation { .. } => ActionResult::Success,
        }
    }

    /// Topple every stack whose base lies within the contact radius of the
    /// segment the robot just drove along.
    fn knock_over_stacks(&mut self, from: Pose, to: Pose) {
        let radius = self.config.contact_radius_mm;
        let hits: Vec<(ObjectId, Pose)> = self
            .world
            .located_objects()
            .into_iter()
            .filter(|o| o.pose.frame == from.frame)
            .filter(|o| distance_to_segment(&o.pose, &from, &to) <= radius)
            .filter_map(|o| {
                self.world
                    .top_of(o.id, BLOCK_SIZE_MM / 2.0)
                    .map(|top| (top, o.pose))
            })
            .collect();
        for (top, base) in hits {
            self.topple(top, base, from.angle_rad);
        }
    }

    /// `object` falls off `base` and lands on its side in the direction of
    /// `heading_rad`.
    fn topple(&mut self, object: ObjectId, base: Pose, heading_rad: f32) {
        let landing = Pose {
            z_mm: 0.0,
            angle_rad: heading_rad,
            ..base
        }
        .advanced(BLOCK_SIZE_MM * 1.5);
        if let Some(block) = self.world.blocks.get_mut(&object) {
            block.pose = landing;
            block.orientation = ObjectOrientation::OnSide;
        }
        info!(%object, pose = %landing, "stack knocked over");
        self.emit(EventPayload::ObjectMoved { object });
        self.emit(EventPayload::ObjectObserved {
            object,
            pose: landing,
        });
    }

    fn set_down_carried(&mut self) {
        let Some(object) = self.world.carried.take() else {
            return;
        };
        let pose = self.world.robot.advanced(BLOCK_SIZE_MM * 1.5);
        if let Some(block) = self.world.blocks.get_mut(&object) {
            block.pose = pose;
            block.orientation = ObjectOrientation::Upright;
        }
        info!(%object, %pose, "carried block set down");
        self.emit(EventPayload::ObjectObserved { object, pose });
    }

    fn emit(&mut self, payload: EventPayload) {
        self.events.push(Event::new(EVENT_SOURCE, payload));
    }
}

fn distance_to_segment(point: &Pose, from: &Pose, to: &Pose) -> f32 {
    let (dx, dy) = (to.x_mm - from.x_mm, to.y_mm - from.y_mm);
    let len_sq = dx * dx + dy * dy;
    let t = if len_sq == 0.0 {
        0.0
    } else {
        (((point.x_mm - from.x_mm) * dx + (point.y_mm - from.y_mm) * dy) / len_sq).clamp(0.0, 1.0)
    };
    let (cx, cy) = (from.x_mm + t * dx, from.y_mm + t * dy);
    (point.x_mm - cx).hypot(point.y_mm - cy)
}

// ────────────────────────────────────────────────────────────────────────────
// Builder
// ────────────────────────────────────────────────────────────────────────────

/// Fluent builder for [`SimRobot`].
#[derive(Default)]
pub struct SimRobotBuilder {
    config: SimConfig,
    blocks: BTreeMap<ObjectId, SimBlock>,
    robot: Option<Pose>,
    face: Option<Pose>,
}

impl SimRobotBuilder {
    /// Place a block on the ground.
    pub fn with_block(mut self, id: ObjectId, pose: Pose, orientation: ObjectOrientation) -> Self {
        self.blocks.insert(id, SimBlock { pose, orientation });
        self
    }

    /// Place `top` upright on `bottom`.  `bottom` must already be added.
    pub fn with_block_on(mut self, top: ObjectId, bottom: ObjectId) -> Self {
        if let Some(base) = self.blocks.get(&bottom).map(|b| b.pose) {
            let pose = base.at_height(base.z_mm + BLOCK_SIZE_MM);
            self.blocks.insert(
                top,
                SimBlock {
                    pose,
                    orientation: ObjectOrientation::Upright,
                },
            );
        }
        self
    }

    pub fn with_robot_at(mut self, pose: Pose) -> Self {
        self.robot = Some(pose);
        self
    }

    /// A face was seen at `pose` before the run started.
    pub fn with_face(mut self, pose: Pose) -> Self {
        self.face = Some(pose);
        self
    }

    pub fn with_config(mut self, config: SimConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_command_ticks(mut self, ticks: u32) -> Self {
        self.config.command_ticks = ticks;
        self
    }

    /// Build the robot.  Initial sightings are queued as events.
    pub fn build(self) -> SimRobot {
        let world = SimWorld {
            blocks: self.blocks,
            robot: self.robot.unwrap_or(Pose::new(0.0, 0.0, 0.0)),
            face: self.face.map(|pose| FaceObservation {
                observed_tick: 0,
                pose,
            }),
            carried: None,
        };
        let motors = SimMotors {
            command_ticks: self.config.command_ticks,
            animation_ticks: self.config.animation_ticks,
            ..SimMotors::default()
        };
        let mut robot = SimRobot {
            config: self.config,
            world,
            motors,
            events: Vec::new(),
            ticks: 0,
        };
        if let Some(face) = robot.world.face {
            robot.emit(EventPayload::FaceObserved { pose: face.pose });
        }
        for handle in robot.world.located_objects() {
            robot.emit(EventPayload::ObjectObserved {
                object: handle.id,
                pose: handle.pose,
            });
        }
        robot
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
