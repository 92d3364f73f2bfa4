//! `botcore-actions` – Action execution engine
//!
//! Everything a behavior hands to the robot is an [`Action`].  Actions are
//! composed into trees, queued, and advanced once per control-loop tick.
//!
//! # Modules
//!
//! - [`action`] – [`Action`] lifecycle, the [`Primitive`] trait for leaf
//!   logic, and per-action options such as precondition-pose checks.
//! - [`compound`] – [`CompoundAction`]: sequential or parallel groups with
//!   failure policy, shared track claims and completion proxying.
//! - [`retry`] – [`RetryWrapper`]: rebuilds an action after
//!   `Failure(Retry)`, optionally running a feedback action in between.
//! - [`queue`] – [`ActionQueue`]: the main slot plus parallel slots, with
//!   tag-based cancellation.
//! - [`primitives`] – motor-command backed primitives (drive, turn, lift,
//!   head, animation, wait, object interaction).
//! - [`context`] – the [`WorldView`] and [`CommandSink`] boundaries.

pub mod action;
pub mod compound;
pub mod context;
pub mod primitives;
pub mod queue;
pub mod retry;

#[cfg(test)]
mod testing;

pub use action::{Action, ActionOptions, ActionPath, PoseTolerance, Primitive};
pub use compound::{CompletionSource, CompoundAction, CompoundMode};
pub use context::{ActionContext, CommandSink, Host, WorldView, next_tag};
pub use queue::{ActionQueue, CompletedAction, QueueError, QueuePosition, SlotId};
pub use retry::{RetryAttempt, RetryDecision, RetryState, RetryWrapper};
