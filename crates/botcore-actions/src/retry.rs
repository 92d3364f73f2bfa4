//! [`RetryWrapper`] – bounded re-attempts of a retryable action.
//!
//! The wrapper owns the current attempt plus a rebuild closure.  When the
//! attempt ends in `Failure(Retry)` and budget remains, a fresh instance is
//! built (new tag, no stale track claim) and started on the next tick.  Every
//! other terminal result passes straight through.
//!
//! The budget counts rebuilds: `max_retries = 2` runs the action at most
//! three times.  Zero disables retrying.
//!
//! ```text
//!             Failure(Retry), budget left
//!    ┌──────────────┐ ───────────────────▶ ┌──────────────┐
//!    │  Attempting  │                      │ RetryPending │  (feedback action)
//!    └──────────────┘ ◀─────────────────── └──────────────┘
//!           │           feedback finished
//!           │ Failure(Retry), budget spent or vetoed
//!           ▼
//!    ┌──────────────┐
//!    │  Exhausted   │  fallback action, or Failure(Abort)
//!    └──────────────┘
//! ```

use botcore_kernel::InheritedClaim;
use botcore_types::{ActionResult, ActionTag, TrackSet};
use tracing::{info, warn};

use crate::action::{Action, ActionKind};
use crate::context::ActionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting,
    RetryPending,
    Exhausted,
}

/// What the retry callback sees when an attempt asks to be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    pub max_retries: u32,
    pub failed: ActionTag,
    pub result: ActionResult,
}

/// The retry callback's verdict.
pub enum RetryDecision {
    /// Rebuild and try again, optionally running `feedback` to completion
    /// first (e.g. a "try again" animation).
    Retry { feedback: Option<Action> },
    /// Stop retrying even though budget remains.
    GiveUp,
}

type Rebuild = Box<dyn FnMut() -> Action>;
type OnRetry = Box<dyn FnMut(&RetryAttempt) -> RetryDecision>;

/// Decorates an action with a bounded re-attempt policy.
///
/// # Example
///
/// ```
/// use botcore_actions::primitives::{drive_straight, play_animation};
/// use botcore_actions::{RetryDecision, RetryWrapper};
///
/// let action = RetryWrapper::new(3, || drive_straight(50.0, 100.0))
///     .on_retry(|_attempt| RetryDecision::Retry {
///         feedback: Some(play_animation("try_again")),
///     })
///     .with_fallback(play_animation("frustrated"))
///     .into_action("nudge_forward");
///
/// assert_eq!(action.as_retry().unwrap().attempts(), 1);
/// ```
pub struct RetryWrapper {
    rebuild: Rebuild,
    current: Action,
    feedback: Option<Action>,
    fallback: Option<Action>,
    on_retry: Option<OnRetry>,
    retries: u32,
    max_retries: u32,
    state: RetryState,
}

impl RetryWrapper {
    /// Wrap the action produced by `rebuild`, rebuilding it at most
    /// `max_retries` times after the first attempt.
    pub fn new(max_retries: u32, mut rebuild: impl FnMut() -> Action + 'static) -> Self {
        let current = rebuild();
        Self {
            rebuild: Box::new(rebuild),
            current,
            feedback: None,
            fallback: None,
            on_retry: None,
            retries: 0,
            max_retries,
            state: RetryState::Attempting,
        }
    }

    /// Run `fallback` instead of reporting `Failure(Abort)` once retries are
    /// exhausted.
    pub fn with_fallback(mut self, fallback: Action) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn on_retry(mut self, callback: impl FnMut(&RetryAttempt) -> RetryDecision + 'static) -> Self {
        self.on_retry = Some(Box::new(callback));
        self
    }

    pub fn into_action(self, name: impl Into<String>) -> Action {
        Action::with_kind(name, ActionKind::Retry(Box::new(self)))
    }

    /// Attempts started so far, the first included.
    pub fn attempts(&self) -> u32 {
        self.retries + 1
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn current(&self) -> &Action {
        &self.current
    }

    /// The action being run right now: the attempt, the feedback between
    /// attempts, or the fallback.
    pub fn active(&self) -> Option<&Action> {
        match self.state {
            RetryState::Attempting => Some(&self.current),
            RetryState::RetryPending => self.feedback.as_ref(),
            RetryState::Exhausted => self.fallback.as_ref(),
        }
    }

    pub(crate) fn active_mut(&mut self) -> Option<&mut Action> {
        match self.state {
            RetryState::Attempting => Some(&mut self.current),
            RetryState::RetryPending => self.feedback.as_mut(),
            RetryState::Exhausted => self.fallback.as_mut(),
        }
    }

    pub(crate) fn required_tracks(&self) -> TrackSet {
        let mut tracks = self.current.required_tracks();
        if let Some(fallback) = &self.fallback {
            tracks |= fallback.required_tracks();
        }
        tracks
    }

    pub(crate) fn init(
        &mut self,
        ctx: &mut ActionContext<'_>,
        grants: &[InheritedClaim],
    ) -> ActionResult {
        self.tick(ctx, grants)
    }

    pub(crate) fn tick(
        &mut self,
        ctx: &mut ActionContext<'_>,
        grants: &[InheritedClaim],
    ) -> ActionResult {
        match self.state {
            RetryState::Attempting => {
                let result = self.current.update(ctx, grants);
                if !result.is_retry() {
                    return result;
                }
                self.on_attempt_failed(ctx, grants, result)
            }
            RetryState::RetryPending => {
                let done = self
                    .feedback
                    .as_mut()
                    .map_or(true, |fb| fb.update(ctx, grants).is_terminal());
                if done {
                    self.feedback = None;
                    self.next_attempt();
                }
                ActionResult::Running
            }
            RetryState::Exhausted => match self.fallback.as_mut() {
                Some(fallback) => fallback.update(ctx, grants),
                None => ActionResult::ABORT,
            },
        }
    }

    fn on_attempt_failed(
        &mut self,
        ctx: &mut ActionContext<'_>,
        grants: &[InheritedClaim],
        result: ActionResult,
    ) -> ActionResult {
        let decision = if self.retries < self.max_retries {
            let attempt = RetryAttempt {
                attempt: self.attempts(),
                max_retries: self.max_retries,
                failed: self.current.tag(),
                result,
            };
            match self.on_retry.as_mut() {
                Some(callback) => callback(&attempt),
                None => RetryDecision::Retry { feedback: None },
            }
        } else {
            RetryDecision::GiveUp
        };

        match decision {
            RetryDecision::Retry { feedback: Some(feedback) } => {
                info!(retry = self.retries + 1, max = self.max_retries, "retrying after feedback");
                self.feedback = Some(feedback);
                self.state = RetryState::RetryPending;
                ActionResult::Running
            }
            RetryDecision::Retry { feedback: None } => {
                info!(retry = self.retries + 1, max = self.max_retries, "retrying");
                self.next_attempt();
                ActionResult::Running
            }
            RetryDecision::GiveUp => {
                warn!(attempts = self.attempts(), max_retries = self.max_retries, "retries exhausted");
                self.state = RetryState::Exhausted;
                match self.fallback.as_mut() {
                    Some(fallback) => fallback.update(ctx, grants),
                    None => ActionResult::ABORT,
                }
            }
        }
    }

    fn next_attempt(&mut self) {
        self.current = (self.rebuild)();
        self.retries += 1;
        self.state = RetryState::Attempting;
    }

    pub(crate) fn cancel_active(&mut self, ctx: &mut ActionContext<'_>) {
        if let Some(active) = self.active_mut() {
            active.cancel(ctx);
        }
    }
}
