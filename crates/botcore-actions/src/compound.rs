//! [`CompoundAction`] – sequential and parallel composition of actions.
//!
//! | Mode | Per tick | Result |
//! |------|----------|--------|
//! | [`Sequential`][CompoundMode::Sequential] | advances the child under the cursor | first failure, or `Success` once every child succeeded |
//! | [`Parallel`][CompoundMode::Parallel] | polls every non-terminated child in order | `Running` while any child runs, then `Success` or the first failure |
//!
//! With [`suppress_child_locking`][CompoundAction::suppress_child_locking]
//! the compound claims the union of its descendants' tracks once and hands
//! the claim down, so back-to-back children on the same track never contend
//! with each other.

use botcore_kernel::InheritedClaim;
use botcore_types::{ActionResult, ActionState, TrackSet};
use tracing::debug;

use crate::action::{Action, ActionKind};
use crate::context::ActionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompoundMode {
    Sequential,
    Parallel,
}

/// Whose completion counts as the compound's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionSource {
    #[default]
    SelfAggregate,
    /// The child at this index, resolved into the compound's own child list.
    Child(usize),
}

/// An action that owns an ordered list of child actions.
pub struct CompoundAction {
    mode: CompoundMode,
    children: Vec<Action>,
    cursor: usize,
    continue_on_failure: bool,
    suppress_child_locking: bool,
    completion: CompletionSource,
    first_failure: Option<ActionResult>,
}

impl CompoundAction {
    fn new(mode: CompoundMode, children: Vec<Action>) -> Self {
        Self {
            mode,
            children,
            cursor: 0,
            continue_on_failure: false,
            suppress_child_locking: false,
            completion: CompletionSource::SelfAggregate,
            first_failure: None,
        }
    }

    /// Children run one after another.
    pub fn sequential(children: Vec<Action>) -> Self {
        Self::new(CompoundMode::Sequential, children)
    }

    /// Children run side by side.
    pub fn parallel(children: Vec<Action>) -> Self {
        Self::new(CompoundMode::Parallel, children)
    }

    /// Keep going after a child fails; the first failure is still reported
    /// once every child has run.
    pub fn continue_on_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }

    /// Claim every descendant track up front on behalf of all children.
    pub fn suppress_child_locking(mut self) -> Self {
        self.suppress_child_locking = true;
        self
    }

    /// Report completion under the tag and result of child `index`.
    pub fn complete_with_child(mut self, index: usize) -> Self {
        self.completion = CompletionSource::Child(index);
        self
    }

    pub fn into_action(self, name: impl Into<String>) -> Action {
        Action::with_kind(name, ActionKind::Compound(self))
    }

    pub fn mode(&self) -> CompoundMode {
        self.mode
    }

    pub fn children(&self) -> &[Action] {
        &self.children
    }

    pub fn completion_source(&self) -> CompletionSource {
        self.completion
    }

    pub fn suppresses_child_locking(&self) -> bool {
        self.suppress_child_locking
    }

    /// Number of children currently initialised or running.
    pub fn live_children(&self) -> usize {
        self.children.iter().filter(|c| c.state().is_live()).count()
    }

    pub(crate) fn child_mut(&mut self, index: usize) -> Option<&mut Action> {
        self.children.get_mut(index)
    }

    pub(crate) fn completion_child(&self) -> Option<&Action> {
        match self.completion {
            CompletionSource::SelfAggregate => None,
            CompletionSource::Child(index) => self.children.get(index),
        }
    }

    pub(crate) fn required_tracks(&self) -> TrackSet {
        self.children
            .iter()
            .fold(TrackSet::EMPTY, |acc, c| acc | c.required_tracks())
    }

    pub(crate) fn init(
        &mut self,
        ctx: &mut ActionContext<'_>,
        grants: &[InheritedClaim],
    ) -> ActionResult {
        match self.mode {
            CompoundMode::Sequential => self.step_sequential(ctx, grants),
            CompoundMode::Parallel => {
                let results: Vec<ActionResult> = self
                    .children
                    .iter_mut()
                    .map(|child| {
                        if child.state() == ActionState::Created {
                            child.update(ctx, grants)
                        } else {
                            child.result()
                        }
                    })
                    .collect();
                Self::combine(&results)
            }
        }
    }

    pub(crate) fn tick(
        &mut self,
        ctx: &mut ActionContext<'_>,
        grants: &[InheritedClaim],
    ) -> ActionResult {
        match self.mode {
            CompoundMode::Sequential => self.step_sequential(ctx, grants),
            CompoundMode::Parallel => {
                // Snapshot every child's result before combining so no child
                // observes a sibling's completion from this same tick.
                let results: Vec<ActionResult> = self
                    .children
                    .iter_mut()
                    .map(|child| child.update(ctx, grants))
                    .collect();
                Self::combine(&results)
            }
        }
    }

    pub(crate) fn cancel_children(&mut self, ctx: &mut ActionContext<'_>) {
        for child in self.children.iter_mut().rev() {
            child.cancel(ctx);
        }
    }

    /// Advance the child under the cursor by one tick.  Children that were
    /// already terminated when the cursor reaches them are consumed without
    /// spending the tick.
    fn step_sequential(
        &mut self,
        ctx: &mut ActionContext<'_>,
        grants: &[InheritedClaim],
    ) -> ActionResult {
        loop {
            let Some(child) = self.children.get_mut(self.cursor) else {
                return self.first_failure.unwrap_or(ActionResult::Success);
            };
            let prebuilt_done = child.state().is_terminated();
            let result = if prebuilt_done {
                child.result()
            } else {
                child.update(ctx, grants)
            };

            match result {
                ActionResult::Running => return ActionResult::Running,
                ActionResult::Success => {}
                failure => {
                    if !self.continue_on_failure {
                        return failure;
                    }
                    self.first_failure.get_or_insert(failure);
                }
            }

            debug!(child = %child.tag(), cursor = self.cursor, %result, "sequential child done");
            self.cursor += 1;
            if !prebuilt_done {
                // The next child starts on the following tick.
                return match self.children.get(self.cursor) {
                    None => self.first_failure.unwrap_or(ActionResult::Success),
                    Some(_) => ActionResult::Running,
                };
            }
        }
    }

    fn combine(results: &[ActionResult]) -> ActionResult {
        let mut first_failure = None;
        for result in results {
            match result {
                ActionResult::Running => return ActionResult::Running,
                ActionResult::Success => {}
                failure => {
                    first_failure.get_or_insert(*failure);
                }
            }
        }
        first_failure.unwrap_or(ActionResult::Success)
    }
}

#[cfg(test)]
mod tests {
    use botcore_types::{FailureKind, Track};

    use super::*;
    use crate::testing::{Rig, Scripted, entries, log};

    const RUNNING: ActionResult = ActionResult::Running;
    const SUCCESS: ActionResult = ActionResult::Success;

    #[test]
    fn sequential_runs_children_in_order() {
        let log = log();
        let mut rig = Rig::new();
        let mut action = CompoundAction::sequential(vec![
            Scripted::new("lift", Track::Lift.into(), &log)
                .then(&[SUCCESS])
                .action(),
            Scripted::new("drive", Track::Body.into(), &log)
                .then(&[RUNNING, SUCCESS])
                .action(),
        ])
        .into_action("seq");

        let (result, _) = rig.run(&mut action, 10);
        assert_eq!(result, SUCCESS);
        assert_eq!(
            entries(&log),
            ["init:lift", "check:lift", "init:drive", "check:drive", "check:drive"]
        );
        assert!(rig.tracks.locked_tracks().is_empty());
    }

    #[test]
    fn sequential_has_at_most_one_live_child() {
        let log = log();
        let mut rig = Rig::new();
        let mut action = CompoundAction::sequential(vec![
            Scripted::new("a", Track::Lift.into(), &log)
                .then(&[RUNNING, SUCCESS])
                .action(),
            Scripted::new("b", Track::Head.into(), &log)
                .then(&[RUNNING, SUCCESS])
                .action(),
        ])
        .into_action("seq");

        loop {
            let result = rig.update(&mut action);
            let live = action.as_compound().map_or(0, CompoundAction::live_children);
            assert!(live <= 1, "{live} children live at once");
            if result.is_terminal() {
                break;
            }
        }
    }

    #[test]
    fn sequential_failure_propagates_immediately() {
        let log = log();
        let mut rig = Rig::new();
        let mut action = CompoundAction::sequential(vec![
            Scripted::new("a", Track::Lift.into(), &log)
                .then(&[ActionResult::Failure(FailureKind::BadTarget)])
                .action(),
            Scripted::new("b", Track::Head.into(), &log).action(),
        ])
        .into_action("seq");

        let (result, _) = rig.run(&mut action, 10);
        assert_eq!(result, ActionResult::Failure(FailureKind::BadTarget));
        assert!(!entries(&log).contains(&"init:b".to_string()));
    }

    #[test]
    fn continue_on_failure_runs_every_child() {
        let log = log();
        let mut rig = Rig::new();
        let mut action = CompoundAction::sequential(vec![
            Scripted::new("a", Track::Lift.into(), &log)
                .then(&[ActionResult::ABORT])
                .action(),
            Scripted::new("b", Track::Head.into(), &log)
                .then(&[SUCCESS])
                .action(),
        ])
        .continue_on_failure()
        .into_action("seq");

        let (result, _) = rig.run(&mut action, 10);
        assert_eq!(result, ActionResult::ABORT);
        assert!(entries(&log).contains(&"check:b".to_string()));
    }

    #[test]
    fn single_child_sequence_matches_bare_action() {
        for script in [
            vec![SUCCESS],
            vec![RUNNING, RUNNING, ActionResult::Failure(FailureKind::NoPoseFound)],
        ] {
            let log = log();
            let mut rig = Rig::new();
            let mut bare = Scripted::new("a", Track::Body.into(), &log)
                .then(&script)
                .action();
            let bare_run = rig.run(&mut bare, 10);

            let mut wrapped = CompoundAction::sequential(vec![
                Scripted::new("a", Track::Body.into(), &log)
                    .then(&script)
                    .action(),
            ])
            .into_action("wrapper");
            let wrapped_run = rig.run(&mut wrapped, 10);

            assert_eq!(bare_run, wrapped_run);
        }
    }

    #[test]
    fn prebuilt_terminated_child_is_skipped() {
        let log = log();
        let mut rig = Rig::new();
        let mut done = Scripted::new("done", Track::Lift.into(), &log)
            .then(&[SUCCESS])
            .action();
        rig.run(&mut done, 5);

        let mut action = CompoundAction::sequential(vec![
            done,
            Scripted::new("next", Track::Lift.into(), &log)
                .then(&[SUCCESS])
                .action(),
        ])
        .into_action("seq");
        let (result, ticks) = rig.run(&mut action, 10);
        assert_eq!(result, SUCCESS);
        assert_eq!(ticks, 2);
    }

    #[test]
    fn parallel_conflict_aborts_second_child_only() {
        let log = log();
        let mut rig = Rig::new();
        let mut action = CompoundAction::parallel(vec![
            Scripted::new("drive", Track::Body.into(), &log)
                .then(&[RUNNING, RUNNING, SUCCESS])
                .action(),
            Scripted::new("anim", TrackSet::ALL, &log).action(),
        ])
        .into_action("par");

        assert_eq!(rig.update(&mut action), RUNNING);
        let compound = action.as_compound().unwrap();
        assert_eq!(compound.children()[1].result(), ActionResult::ABORT);
        assert_eq!(compound.children()[0].state(), ActionState::Initialized);

        let (result, _) = rig.run(&mut action, 10);
        assert_eq!(result, ActionResult::ABORT);
        assert_eq!(
            entries(&log),
            ["init:drive", "check:drive", "check:drive", "check:drive"]
        );
    }

    #[test]
    fn parallel_succeeds_when_all_children_succeed() {
        let log = log();
        let mut rig = Rig::new();
        let mut action = CompoundAction::parallel(vec![
            Scripted::new("head", Track::Head.into(), &log)
                .then(&[SUCCESS])
                .action(),
            Scripted::new("lift", Track::Lift.into(), &log)
                .then(&[RUNNING, RUNNING, SUCCESS])
                .action(),
        ])
        .into_action("par");
        assert_eq!(rig.run(&mut action, 10), (SUCCESS, 4));
    }

    #[test]
    fn suppressed_children_share_parent_claim() {
        let log = log();
        let mut rig = Rig::new();
        let mut action = CompoundAction::parallel(vec![
            Scripted::new("lift_a", Track::Lift.into(), &log)
                .then(&[SUCCESS])
                .action(),
            Scripted::new("lift_b", Track::Lift.into(), &log)
                .then(&[SUCCESS])
                .action(),
        ])
        .suppress_child_locking()
        .into_action("lifts");
        let parent = action.tag();

        assert_eq!(rig.update(&mut action), RUNNING);
        assert_eq!(rig.tracks.holder(Track::Lift), Some(parent));
        assert_eq!(rig.run(&mut action, 5).0, SUCCESS);
        assert!(rig.tracks.locked_tracks().is_empty());
    }

    #[test]
    fn cancel_aborts_children_bottom_up() {
        let log = log();
        let mut rig = Rig::new();
        let mut action = CompoundAction::parallel(vec![
            Scripted::new("a", Track::Lift.into(), &log).then(&[RUNNING]).action(),
            Scripted::new("b", Track::Head.into(), &log).then(&[RUNNING]).action(),
        ])
        .into_action("par");
        rig.update(&mut action);
        rig.cancel(&mut action);

        assert_eq!(action.result(), ActionResult::ABORT);
        assert!(rig.tracks.locked_tracks().is_empty());
        let compound = action.as_compound().unwrap();
        assert!(compound.children().iter().all(|c| c.result() == ActionResult::ABORT));
        assert_eq!(entries(&log), ["init:a", "init:b", "cancel:b", "cancel:a"]);
    }

    #[test]
    fn completion_proxies_to_child() {
        let log = log();
        let mut rig = Rig::new();
        let drive = Scripted::new("drive", Track::Body.into(), &log)
            .then(&[ActionResult::Failure(FailureKind::NoPoseFound)])
            .action();
        let drive_tag = drive.tag();
        let mut action = CompoundAction::sequential(vec![drive])
            .complete_with_child(0)
            .into_action("proxy");

        assert_eq!(action.completion_tag(), drive_tag);
        rig.run(&mut action, 5);
        assert_eq!(
            action.completion_result(),
            ActionResult::Failure(FailureKind::NoPoseFound)
        );
    }
}
