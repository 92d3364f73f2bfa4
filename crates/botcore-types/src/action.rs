//! Action identity and outcome vocabulary shared by the engine and behaviors.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Process-unique identity of a single action instance.
///
/// Tags are handed out by the action engine when an action is built and are
/// never reused within a process.  [`ActionTag::INVALID`] is the reserved
/// "unset" value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionTag(u32);

impl ActionTag {
    /// Sentinel meaning "no action".
    pub const INVALID: ActionTag = ActionTag(0);

    pub const fn from_raw(raw: u32) -> Self {
        ActionTag(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Specific cause of a terminal failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Unrecoverable (missing target, track conflict, cancellation).
    Abort,
    /// Failed this attempt; a retry wrapper may rebuild and try again.
    Retry,
    /// The target object is gone or unusable.
    BadTarget,
    /// No approach pose could be found for the target.
    NoPoseFound,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Abort => "abort",
            FailureKind::Retry => "retry",
            FailureKind::BadTarget => "bad_target",
            FailureKind::NoPoseFound => "no_pose_found",
        };
        f.write_str(s)
    }
}

/// Tri-state result of `init` / `check_if_done`.
///
/// ```
/// use botcore_types::{ActionResult, FailureKind};
///
/// assert!(!ActionResult::Running.is_terminal());
/// assert!(ActionResult::Success.is_terminal());
/// assert!(ActionResult::Failure(FailureKind::Retry).is_retry());
/// assert!(!ActionResult::Failure(FailureKind::BadTarget).is_retry());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "result", content = "kind", rename_all = "snake_case")]
pub enum ActionResult {
    Running,
    Success,
    Failure(FailureKind),
}

impl ActionResult {
    /// Shorthand for `Failure(Abort)`.
    pub const ABORT: ActionResult = ActionResult::Failure(FailureKind::Abort);

    pub const fn is_terminal(self) -> bool {
        !matches!(self, ActionResult::Running)
    }

    pub const fn is_success(self) -> bool {
        matches!(self, ActionResult::Success)
    }

    pub const fn is_failure(self) -> bool {
        matches!(self, ActionResult::Failure(_))
    }

    /// `true` only for `Failure(Retry)`, the one failure a retry wrapper
    /// handles locally.
    pub const fn is_retry(self) -> bool {
        matches!(self, ActionResult::Failure(FailureKind::Retry))
    }

    pub const fn failure_kind(self) -> Option<FailureKind> {
        match self {
            ActionResult::Failure(kind) => Some(kind),
            _ => None,
        }
    }
}

impl fmt::Display for ActionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionResult::Running => f.write_str("running"),
            ActionResult::Success => f.write_str("success"),
            ActionResult::Failure(kind) => write!(f, "failure({kind})"),
        }
    }
}

/// Lifecycle of one action instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Built and owned, `init` not yet called.
    Created,
    /// `init` succeeded, tracks are claimed.
    Initialized,
    /// `check_if_done` has been polled at least once and returned `Running`.
    Running,
    /// Reached a terminal result; tracks are released.
    Terminated,
}

impl ActionState {
    pub const fn is_terminated(self) -> bool {
        matches!(self, ActionState::Terminated)
    }

    /// Initialized or running: the action holds its tracks and is polled.
    pub const fn is_live(self) -> bool {
        matches!(self, ActionState::Initialized | ActionState::Running)
    }
}
