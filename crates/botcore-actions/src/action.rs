//! [`Action`] – the atomic schedulable unit and its lifecycle engine.
//!
//! An action is one of a closed set of kinds:
//!
//! | Kind | Built with | Work done per tick |
//! |------|------------|--------------------|
//! | Primitive | [`Action::from_primitive`] | `init` once, then `check_if_done` |
//! | Compound | [`CompoundAction::into_action`] | advances its children |
//! | Retry | [`RetryWrapper::into_action`] | runs the current attempt, rebuilds on `Failure(Retry)` |
//!
//! The lifecycle is `Created → Initialized → Running → Terminated`.  Tracks
//! are claimed right before `init` and released the moment the action
//! terminates, whether it finished, failed or was cancelled.
//!
//! # Example
//!
//! ```
//! use botcore_actions::primitives::{drive_straight, move_lift};
//! use botcore_actions::{Action, CompoundAction};
//! use botcore_types::{LiftTarget, Track};
//!
//! let action: Action = CompoundAction::sequential(vec![
//!     move_lift(LiftTarget::HeightMm(45.0)),
//!     drive_straight(100.0, 150.0),
//! ])
//! .into_action("lift_then_drive");
//!
//! assert_eq!(action.required_tracks(), Track::Lift | Track::Body);
//! assert!(action.tag().is_valid());
//! ```

use std::fmt;

use botcore_kernel::{InheritedClaim, TrackClaim, TrackConflict, TrackLockTable};
use botcore_types::{ActionResult, ActionState, ActionTag, FailureKind, Pose, TrackSet};
use tracing::{debug, info, warn};

use crate::compound::CompoundAction;
use crate::context::{ActionContext, WorldView, next_tag};
use crate::retry::RetryWrapper;

// ─────────────────────────────────────────────────────────────────────────────
// Primitive contract
// ─────────────────────────────────────────────────────────────────────────────

/// Behavior-specific leaf logic.
///
/// `init` is called exactly once.  `check_if_done` is then called once per
/// tick until it returns a terminal result and must not re-issue a command
/// it already issued.
pub trait Primitive {
    fn name(&self) -> &str;

    /// Tracks this primitive needs exclusive use of.
    fn tracks(&self) -> TrackSet;

    fn init(&mut self, ctx: &mut ActionContext<'_>) -> ActionResult;

    fn check_if_done(&mut self, ctx: &mut ActionContext<'_>) -> ActionResult;

    /// Called when the action is cancelled after a successful `init`.
    fn on_cancel(&mut self, _ctx: &mut ActionContext<'_>) {}

    /// Poses the robot must be in before `init`, any one of which will do.
    /// Only consulted when the action checks its precondition pose.
    fn precondition_poses(&self, _world: &dyn WorldView) -> Vec<Pose> {
        Vec::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Options
// ─────────────────────────────────────────────────────────────────────────────

/// How close the robot must be to a precondition pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseTolerance {
    pub distance_mm: f32,
    pub angle_rad: f32,
}

impl Default for PoseTolerance {
    fn default() -> Self {
        Self {
            distance_mm: 30.0,
            angle_rad: 45f32.to_radians(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActionOptions {
    /// Fail with `Failure(Retry)` before `init` when the robot is not in one
    /// of the primitive's precondition poses.
    pub check_precondition_pose: bool,
    /// Whether the queuing behavior hears about completion.
    pub emit_completion: bool,
    pub pose_tolerance: PoseTolerance,
}

impl Default for ActionOptions {
    fn default() -> Self {
        Self {
            check_precondition_pose: false,
            emit_completion: true,
            pose_tolerance: PoseTolerance::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Action
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) enum ActionKind {
    Primitive(Box<dyn Primitive>),
    Compound(CompoundAction),
    Retry(Box<RetryWrapper>),
}

enum Claim {
    Unclaimed,
    /// Every required track is covered by an ancestor's grant.
    Covered,
    Owned(TrackClaim),
}

/// Index path from a root action down to a descendant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionPath(Vec<usize>);

impl ActionPath {
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

/// A schedulable unit of robot work.
pub struct Action {
    tag: ActionTag,
    name: String,
    state: ActionState,
    result: ActionResult,
    options: ActionOptions,
    claim: Claim,
    kind: ActionKind,
}

impl Action {
    pub fn from_primitive(primitive: impl Primitive + 'static) -> Self {
        let name = primitive.name().to_string();
        Self::with_kind(name, ActionKind::Primitive(Box::new(primitive)))
    }

    pub(crate) fn with_kind(name: impl Into<String>, kind: ActionKind) -> Self {
        Self {
            tag: next_tag(),
            name: name.into(),
            state: ActionState::Created,
            result: ActionResult::Running,
            options: ActionOptions::default(),
            claim: Claim::Unclaimed,
            kind,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn check_precondition_pose(mut self, check: bool) -> Self {
        self.options.check_precondition_pose = check;
        self
    }

    pub fn with_pose_tolerance(mut self, tolerance: PoseTolerance) -> Self {
        self.options.pose_tolerance = tolerance;
        self
    }

    /// Completion of this action is not reported to the queuing behavior.
    pub fn without_completion(mut self) -> Self {
        self.options.emit_completion = false;
        self
    }

    pub fn tag(&self) -> ActionTag {
        self.tag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ActionState {
        self.state
    }

    /// Last result produced; `Running` until the action terminates.
    pub fn result(&self) -> ActionResult {
        self.result
    }

    pub fn options(&self) -> &ActionOptions {
        &self.options
    }

    /// Union of the tracks this action and all of its descendants need.
    pub fn required_tracks(&self) -> TrackSet {
        match &self.kind {
            ActionKind::Primitive(p) => p.tracks(),
            ActionKind::Compound(c) => c.required_tracks(),
            ActionKind::Retry(r) => r.required_tracks(),
        }
    }

    /// Tag under which completion is reported: the proxied child's tag when
    /// a compound completes through one of its children.
    pub fn completion_tag(&self) -> ActionTag {
        match &self.kind {
            ActionKind::Compound(c) => c.completion_child().map_or(self.tag, Action::tag),
            _ => self.tag,
        }
    }

    /// Result reported on completion.  A compound completing through a child
    /// reports that child's result once the child has terminated.
    pub fn completion_result(&self) -> ActionResult {
        match &self.kind {
            ActionKind::Compound(c) => c
                .completion_child()
                .filter(|child| child.state.is_terminated())
                .map_or(self.result, Action::result),
            _ => self.result,
        }
    }

    pub fn as_compound(&self) -> Option<&CompoundAction> {
        match &self.kind {
            ActionKind::Compound(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_retry(&self) -> Option<&RetryWrapper> {
        match &self.kind {
            ActionKind::Retry(r) => Some(r.as_ref()),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Tree navigation
    // -------------------------------------------------------------------------

    fn children(&self) -> Vec<&Action> {
        match &self.kind {
            ActionKind::Primitive(_) => Vec::new(),
            ActionKind::Compound(c) => c.children().iter().collect(),
            ActionKind::Retry(r) => r.active().into_iter().collect(),
        }
    }

    fn child_mut(&mut self, index: usize) -> Option<&mut Action> {
        match &mut self.kind {
            ActionKind::Primitive(_) => None,
            ActionKind::Compound(c) => c.child_mut(index),
            ActionKind::Retry(r) => (index == 0).then(|| r.active_mut()).flatten(),
        }
    }

    /// Path to the action whose tag (or completion tag) is `tag`.  The
    /// outermost match wins.
    pub fn locate(&self, tag: ActionTag) -> Option<ActionPath> {
        if self.tag == tag || self.completion_tag() == tag {
            return Some(ActionPath::default());
        }
        self.children()
            .into_iter()
            .enumerate()
            .find_map(|(i, child)| {
                child.locate(tag).map(|mut path| {
                    path.0.insert(0, i);
                    path
                })
            })
    }

    /// The action at `tag`, searching this subtree.
    pub fn find(&self, tag: ActionTag) -> Option<&Action> {
        let path = self.locate(tag)?;
        path.0
            .iter()
            .try_fold(self, |node, &i| node.children().into_iter().nth(i))
    }

    pub(crate) fn at_path_mut(&mut self, path: &ActionPath) -> Option<&mut Action> {
        let mut node = self;
        for &index in &path.0 {
            node = node.child_mut(index)?;
        }
        Some(node)
    }

    // -------------------------------------------------------------------------
    // Engine
    // -------------------------------------------------------------------------

    /// Advance by one tick: `init` a created action, poll a live one.
    /// Terminated actions keep returning their final result.
    pub(crate) fn update(
        &mut self,
        ctx: &mut ActionContext<'_>,
        grants: &[InheritedClaim],
    ) -> ActionResult {
        match self.state {
            ActionState::Created => self.start(ctx, grants),
            ActionState::Initialized | ActionState::Running => self.poll(ctx, grants),
            ActionState::Terminated => self.result,
        }
    }

    fn start(&mut self, ctx: &mut ActionContext<'_>, grants: &[InheritedClaim]) -> ActionResult {
        if self.options.check_precondition_pose && !self.in_precondition_pose(ctx.world) {
            debug!(tag = %self.tag, action = %self.name, "robot not in precondition pose");
            return self.terminate(ctx.tracks, ActionResult::Failure(FailureKind::Retry));
        }

        if let Err(conflict) = self.claim_tracks(ctx.tracks, grants) {
            warn!(tag = %self.tag, action = %self.name, %conflict, "init aborted");
            return self.terminate(ctx.tracks, ActionResult::ABORT);
        }

        debug!(tag = %self.tag, action = %self.name, tick = ctx.tick, "init");
        let child_grants = self.child_grants(grants);
        let result = match &mut self.kind {
            ActionKind::Primitive(p) => match p.init(ctx) {
                ActionResult::Success => ActionResult::Running,
                other => other,
            },
            ActionKind::Compound(c) => c.init(ctx, &child_grants),
            ActionKind::Retry(r) => r.init(ctx, &child_grants),
        };
        self.state = ActionState::Initialized;

        if result.is_terminal() {
            return self.terminate(ctx.tracks, result);
        }
        ActionResult::Running
    }

    fn poll(&mut self, ctx: &mut ActionContext<'_>, grants: &[InheritedClaim]) -> ActionResult {
        let child_grants = self.child_grants(grants);
        let result = match &mut self.kind {
            ActionKind::Primitive(p) => p.check_if_done(ctx),
            ActionKind::Compound(c) => c.tick(ctx, &child_grants),
            ActionKind::Retry(r) => r.tick(ctx, &child_grants),
        };
        if result.is_terminal() {
            return self.terminate(ctx.tracks, result);
        }
        self.state = ActionState::Running;
        ActionResult::Running
    }

    /// Force this action (and its live descendants first) to
    /// `Failure(Abort)`.  No-op once terminated.
    pub(crate) fn cancel(&mut self, ctx: &mut ActionContext<'_>) {
        if self.state.is_terminated() {
            return;
        }
        let was_live = self.state.is_live();
        match &mut self.kind {
            ActionKind::Primitive(p) => {
                if was_live {
                    p.on_cancel(ctx);
                }
            }
            ActionKind::Compound(c) => c.cancel_children(ctx),
            ActionKind::Retry(r) => r.cancel_active(ctx),
        }
        info!(tag = %self.tag, action = %self.name, "action cancelled");
        self.terminate(ctx.tracks, ActionResult::ABORT);
    }

    fn terminate(&mut self, tracks: &mut TrackLockTable, result: ActionResult) -> ActionResult {
        if let Claim::Owned(claim) = std::mem::replace(&mut self.claim, Claim::Unclaimed) {
            tracks.release(claim);
        }
        self.state = ActionState::Terminated;
        self.result = result;
        debug!(tag = %self.tag, action = %self.name, %result, "terminated");
        result
    }

    fn claim_tracks(
        &mut self,
        table: &mut TrackLockTable,
        grants: &[InheritedClaim],
    ) -> Result<(), TrackConflict> {
        let needed = match &self.kind {
            ActionKind::Primitive(p) => p.tracks(),
            ActionKind::Compound(c) if c.suppresses_child_locking() => c.required_tracks(),
            // Children claim for themselves.
            ActionKind::Compound(_) | ActionKind::Retry(_) => return Ok(()),
        };
        let covered = grants
            .iter()
            .filter(|g| table.is_live(**g))
            .fold(TrackSet::EMPTY, |acc, g| acc | g.tracks());
        let remainder = needed - covered;
        self.claim = if remainder.is_empty() {
            Claim::Covered
        } else {
            Claim::Owned(table.try_acquire(self.tag, remainder)?)
        };
        Ok(())
    }

    fn child_grants(&self, grants: &[InheritedClaim]) -> Vec<InheritedClaim> {
        let mut chain = grants.to_vec();
        if let (ActionKind::Compound(_), Claim::Owned(claim)) = (&self.kind, &self.claim) {
            chain.push(claim.inherit());
        }
        chain
    }

    fn in_precondition_pose(&self, world: &dyn WorldView) -> bool {
        let ActionKind::Primitive(p) = &self.kind else {
            return true;
        };
        let poses = p.precondition_poses(world);
        if poses.is_empty() {
            return true;
        }
        let robot = world.robot_pose();
        let tolerance = self.options.pose_tolerance;
        poses.iter().any(|pose| {
            matches!(
                (robot.distance_to(pose), robot.angle_to(pose)),
                (Some(d), Some(a)) if d <= tolerance.distance_mm && a <= tolerance.angle_rad
            )
        })
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            ActionKind::Primitive(_) => "primitive",
            ActionKind::Compound(_) => "compound",
            ActionKind::Retry(_) => "retry",
        };
        f.debug_struct("Action")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .field("kind", &kind)
            .field("state", &self.state)
            .field("result", &self.result)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use botcore_types::{ObjectHandle, ObjectId, ObjectOrientation, Track};

    use super::*;
    use crate::testing::{Rig, Scripted, entries, log};

    const RUNNING: ActionResult = ActionResult::Running;
    const SUCCESS: ActionResult = ActionResult::Success;

    #[test]
    fn init_then_check_on_following_tick() {
        let log = log();
        let mut rig = Rig::new();
        let mut action = Scripted::new("a", Track::Body.into(), &log)
            .then(&[RUNNING, SUCCESS])
            .action();

        assert_eq!(rig.update(&mut action), RUNNING);
        assert_eq!(action.state(), ActionState::Initialized);
        assert_eq!(rig.tracks.holder(Track::Body), Some(action.tag()));

        assert_eq!(rig.update(&mut action), RUNNING);
        assert_eq!(action.state(), ActionState::Running);
        assert_eq!(rig.update(&mut action), SUCCESS);
        assert_eq!(action.state(), ActionState::Terminated);
        assert!(rig.tracks.locked_tracks().is_empty());
        assert_eq!(entries(&log), ["init:a", "check:a", "check:a"]);
    }

    #[test]
    fn terminal_init_skips_check_if_done() {
        let log = log();
        let mut rig = Rig::new();
        let mut action = Scripted::new("gone", Track::Lift.into(), &log)
            .init_with(ActionResult::Failure(FailureKind::BadTarget))
            .action();

        assert_eq!(
            rig.update(&mut action),
            ActionResult::Failure(FailureKind::BadTarget)
        );
        assert_eq!(rig.update(&mut action), action.result());
        assert_eq!(entries(&log), ["init:gone"]);
        assert!(rig.tracks.locked_tracks().is_empty());
    }

    #[test]
    fn track_conflict_aborts_before_init() {
        let log = log();
        let mut rig = Rig::new();
        let mut holder = Scripted::new("holder", Track::Head.into(), &log).action();
        let mut other = Scripted::new("other", Track::Head | Track::Sound, &log).action();

        rig.update(&mut holder);
        assert_eq!(rig.update(&mut other), ActionResult::ABORT);
        assert_eq!(entries(&log), ["init:holder"]);
        assert_eq!(rig.tracks.holder(Track::Head), Some(holder.tag()));
        assert_eq!(rig.tracks.holder(Track::Sound), None);
    }

    #[test]
    fn cancel_releases_tracks_and_calls_hook() {
        let log = log();
        let mut rig = Rig::new();
        let mut action = Scripted::new("a", Track::Body.into(), &log)
            .then(&[RUNNING])
            .action();
        rig.update(&mut action);
        rig.cancel(&mut action);

        assert_eq!(action.result(), ActionResult::ABORT);
        assert!(rig.tracks.locked_tracks().is_empty());
        assert_eq!(entries(&log), ["init:a", "cancel:a"]);

        // A second cancel is a no-op.
        rig.cancel(&mut action);
        assert_eq!(entries(&log).len(), 2);
    }

    #[test]
    fn cancel_before_init_skips_hook() {
        let log = log();
        let mut rig = Rig::new();
        let mut action = Scripted::new("a", Track::Body.into(), &log).action();
        rig.cancel(&mut action);
        assert_eq!(action.state(), ActionState::Terminated);
        assert!(entries(&log).is_empty());
    }

    struct NeedsPose(Pose);

    impl Primitive for NeedsPose {
        fn name(&self) -> &str {
            "needs_pose"
        }
        fn tracks(&self) -> TrackSet {
            Track::Body.into()
        }
        fn init(&mut self, _ctx: &mut ActionContext<'_>) -> ActionResult {
            ActionResult::Running
        }
        fn check_if_done(&mut self, _ctx: &mut ActionContext<'_>) -> ActionResult {
            ActionResult::Success
        }
        fn precondition_poses(&self, _world: &dyn WorldView) -> Vec<Pose> {
            vec![self.0]
        }
    }

    #[test]
    fn precondition_pose_outside_tolerance_requests_retry() {
        let mut rig = Rig::new();
        rig.world.robot = Some(Pose::new(0.0, 0.0, 0.0));

        let mut far = Action::from_primitive(NeedsPose(Pose::new(50.0, 0.0, 0.0)))
            .check_precondition_pose(true);
        assert_eq!(rig.update(&mut far), ActionResult::Failure(FailureKind::Retry));

        let mut near = Action::from_primitive(NeedsPose(Pose::new(20.0, 0.0, 0.3)))
            .check_precondition_pose(true);
        assert_eq!(rig.update(&mut near), ActionResult::Running);
        rig.cancel(&mut near);
        assert!(rig.tracks.locked_tracks().is_empty());

        // Unchecked actions ignore the pose entirely.
        let mut unchecked = Action::from_primitive(NeedsPose(Pose::new(500.0, 0.0, 0.0)));
        assert_eq!(rig.update(&mut unchecked), ActionResult::Running);
    }

    #[test]
    fn precondition_pose_in_other_frame_fails() {
        let mut rig = Rig::new();
        rig.world.objects.push(ObjectHandle {
            id: ObjectId(1),
            pose: Pose::new(0.0, 0.0, 0.0),
            orientation: ObjectOrientation::Upright,
        });
        let target = Pose::new(0.0, 0.0, 0.0).in_frame(botcore_types::FrameId(9));
        let mut action =
            Action::from_primitive(NeedsPose(target)).check_precondition_pose(true);
        assert!(rig.update(&mut action).is_retry());
    }

    #[test]
    fn locate_finds_nested_child() {
        let log = log();
        let inner = Scripted::new("inner", Track::Head.into(), &log).action();
        let inner_tag = inner.tag();
        let action = crate::CompoundAction::sequential(vec![
            Scripted::new("first", Track::Body.into(), &log).action(),
            crate::CompoundAction::parallel(vec![inner]).into_action("group"),
        ])
        .into_action("outer");

        let path = action.locate(inner_tag).unwrap();
        assert_eq!(path.indices(), &[1, 0]);
        assert_eq!(action.find(inner_tag).map(Action::name), Some("inner"));
        assert!(action.locate(ActionTag::from_raw(u32::MAX)).is_none());
    }
}
