//! Boundary traits between the engine and the robot host.
//!
//! The engine never looks at perception or motor internals.  It reads the
//! world through [`WorldView`] and hands commands to a [`CommandSink`], then
//! polls the sink for the same [`ActionResult`] contract its own actions use.

use std::sync::atomic::{AtomicU32, Ordering};

use botcore_kernel::TrackLockTable;
use botcore_types::{
    ActionResult, ActionTag, CommandId, FaceObservation, MotorCommand, ObjectHandle, ObjectId,
    Pose,
};

/// Read-only snapshot of the world as seen by perception.
pub trait WorldView {
    fn located_object(&self, id: ObjectId) -> Option<ObjectHandle>;

    fn pose_of(&self, id: ObjectId) -> Option<Pose> {
        self.located_object(id).map(|h| h.pose)
    }

    fn last_observed_face(&self) -> Option<FaceObservation>;

    /// The object resting on `id`, if one sits within `tolerance_mm` of its
    /// top face.
    fn object_on_top_of(&self, id: ObjectId, tolerance_mm: f32) -> Option<ObjectHandle>;

    fn robot_pose(&self) -> Pose;

    fn located_objects(&self) -> Vec<ObjectHandle>;
}

/// Motor / animation subsystem.
pub trait CommandSink {
    /// Start executing `command`.
    fn issue(&mut self, command: MotorCommand) -> CommandId;

    /// Progress of a previously issued command.  Unknown ids report
    /// `Failure(Abort)`.
    fn poll(&mut self, id: CommandId) -> ActionResult;

    /// Stop a command early.  Unknown or finished ids are ignored.
    fn abort(&mut self, id: CommandId);
}

/// Everything an action may touch during one call.
pub struct ActionContext<'a> {
    pub world: &'a dyn WorldView,
    pub commands: &'a mut dyn CommandSink,
    pub tick: u64,
    pub(crate) tracks: &'a mut TrackLockTable,
}

/// What the host lends the queue for one call: world snapshot, command sink
/// and the current control-loop tick.
pub struct Host<'a> {
    pub world: &'a dyn WorldView,
    pub commands: &'a mut dyn CommandSink,
    pub tick: u64,
}

impl<'a> Host<'a> {
    pub fn new(world: &'a dyn WorldView, commands: &'a mut dyn CommandSink, tick: u64) -> Self {
        Self {
            world,
            commands,
            tick,
        }
    }
}

static NEXT_TAG: AtomicU32 = AtomicU32::new(1);

/// Allocate a process-unique action tag.  Never returns
/// [`ActionTag::INVALID`].
pub fn next_tag() -> ActionTag {
    loop {
        let tag = ActionTag::from_raw(NEXT_TAG.fetch_add(1, Ordering::Relaxed));
        if tag.is_valid() {
            return tag;
        }
    }
}
