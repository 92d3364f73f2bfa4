//! Choosing which side of an object to approach.
//!
//! Every object has four approach poses (see
//! [`approach_poses`][botcore_actions::primitives::approach_poses]).  A
//! candidate is dropped when another located object sits on it.  Among the
//! rest:
//!
//! - with a usable face sighting, pick the pose closest to (or farthest from)
//!   the face, breaking ties by distance to the robot;
//! - with no face sighting, or a face recorded in a different frame than the
//!   candidates, pick the pose closest to the robot and report
//!   [`FaceReference::Unavailable`].
//!
//! ```
//! use botcore_runtime::pose_selection::{FaceReference, FacePreference, select_approach_pose};
//! # use botcore_actions::WorldView;
//! # use botcore_types::*;
//! # struct One(ObjectHandle);
//! # impl WorldView for One {
//! #     fn located_object(&self, id: ObjectId) -> Option<ObjectHandle> { (id == self.0.id).then_some(self.0) }
//! #     fn last_observed_face(&self) -> Option<FaceObservation> { None }
//! #     fn object_on_top_of(&self, _: ObjectId, _: f32) -> Option<ObjectHandle> { None }
//! #     fn robot_pose(&self) -> Pose { Pose::new(-200.0, 0.0, 0.0) }
//! #     fn located_objects(&self) -> Vec<ObjectHandle> { vec![self.0] }
//! # }
//! let block = ObjectHandle {
//!     id: ObjectId(1),
//!     pose: Pose::new(0.0, 0.0, 0.0),
//!     orientation: ObjectOrientation::OnSide,
//! };
//! let world = One(block);
//!
//! let choice = select_approach_pose(&world, ObjectId(1), FacePreference::Closest).unwrap();
//! assert_eq!(choice.face, FaceReference::Unavailable);
//! assert!(choice.pose.x_mm < 0.0); // the side facing the robot
//! ```

use std::cmp::Ordering;

use botcore_actions::primitives::{APPROACH_DISTANCE_MM, approach_poses};
use botcore_actions::{ActionContext, Primitive, WorldView};
use botcore_types::{ActionResult, CommandId, FailureKind, MotorCommand, ObjectId, Pose, TrackSet};
use tracing::debug;

/// Another object closer than this to a candidate pose blocks it.
pub const BLOCKING_RADIUS_MM: f32 = 45.0;

/// Face distances within this margin count as a tie.
const TIE_MARGIN_MM: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacePreference {
    Closest,
    Farthest,
}

/// Whether the face sighting took part in the choice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaceReference {
    Used { distance_mm: f32 },
    /// No face seen, or not comparable with the candidates' frame.
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSelection {
    pub pose: Pose,
    pub face: FaceReference,
}

/// Pick the approach pose for `object`.
///
/// Fails with [`FailureKind::BadTarget`] when the object is not located and
/// with [`FailureKind::NoPoseFound`] when every side is blocked.
pub fn select_approach_pose(
    world: &dyn WorldView,
    object: ObjectId,
    preference: FacePreference,
) -> Result<PoseSelection, FailureKind> {
    let handle = world.located_object(object).ok_or(FailureKind::BadTarget)?;
    let others = world.located_objects();
    let candidates: Vec<Pose> = approach_poses(&handle, APPROACH_DISTANCE_MM)
        .into_iter()
        .filter(|pose| {
            !others.iter().any(|o| {
                o.id != object
                    && o.pose
                        .distance_to(pose)
                        .is_some_and(|d| d < BLOCKING_RADIUS_MM)
            })
        })
        .collect();
    if candidates.is_empty() {
        debug!(%object, "every approach pose is blocked");
        return Err(FailureKind::NoPoseFound);
    }

    let robot = world.robot_pose();
    let robot_distance = |pose: &Pose| robot.distance_to(pose).unwrap_or(f32::MAX);

    let face_distances: Option<Vec<f32>> = world.last_observed_face().and_then(|face| {
        candidates
            .iter()
            .map(|pose| pose.distance_to(&face.pose))
            .collect()
    });

    let Some(face_distances) = face_distances else {
        let pose = candidates
            .iter()
            .copied()
            .min_by(|a, b| robot_distance(a).total_cmp(&robot_distance(b)))
            .ok_or(FailureKind::NoPoseFound)?;
        return Ok(PoseSelection {
            pose,
            face: FaceReference::Unavailable,
        });
    };

    let better = |a: usize, b: usize| -> Ordering {
        let (fa, fb) = (face_distances[a], face_distances[b]);
        if (fa - fb).abs() <= TIE_MARGIN_MM {
            return robot_distance(&candidates[a]).total_cmp(&robot_distance(&candidates[b]));
        }
        match preference {
            FacePreference::Closest => fa.total_cmp(&fb),
            FacePreference::Farthest => fb.total_cmp(&fa),
        }
    };
    let best = (0..candidates.len())
        .min_by(|&a, &b| better(a, b))
        .ok_or(FailureKind::NoPoseFound)?;
    Ok(PoseSelection {
        pose: candidates[best],
        face: FaceReference::Used {
            distance_mm: face_distances[best],
        },
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// DriveToApproachPose
// ─────────────────────────────────────────────────────────────────────────────

/// Selects an approach pose when initialised, then drives there.
pub struct DriveToApproachPose {
    object: ObjectId,
    preference: FacePreference,
    issued: Option<CommandId>,
    selection: Option<PoseSelection>,
}

impl DriveToApproachPose {
    pub fn new(object: ObjectId, preference: FacePreference) -> Self {
        Self {
            object,
            preference,
            issued: None,
            selection: None,
        }
    }

    pub fn selection(&self) -> Option<PoseSelection> {
        self.selection
    }
}

impl Primitive for DriveToApproachPose {
    fn name(&self) -> &str {
        "drive_to_approach_pose"
    }

    fn tracks(&self) -> TrackSet {
        MotorCommand::DriveToPose {
            pose: Pose::new(0.0, 0.0, 0.0),
        }
        .default_tracks()
    }

    fn init(&mut self, ctx: &mut ActionContext<'_>) -> ActionResult {
        match select_approach_pose(ctx.world, self.object, self.preference) {
            Ok(selection) => {
                debug!(object = %self.object, pose = %selection.pose, face = ?selection.face, "approach pose");
                self.selection = Some(selection);
                self.issued = Some(ctx.commands.issue(MotorCommand::DriveToPose {
                    pose: selection.pose,
                }));
                ActionResult::Running
            }
            Err(kind) => ActionResult::Failure(kind),
        }
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
