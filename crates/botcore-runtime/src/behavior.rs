//! The [`Behavior`] contract and the [`BehaviorContext`] a behavior acts
//! through.
//!
//! A behavior never touches the action queue, reaction locks or whiteboard
//! directly.  Everything goes through the context, which records what the
//! behavior holds so the arbiter can undo it on deactivation.
//!
//! # Continuations
//!
//! [`BehaviorContext::start_acting_then`] queues an action and registers a
//! callback that runs exactly once, when that action terminates.  The
//! callback receives the behavior itself, the final [`ActionResult`] and a
//! fresh context, so it can queue the next action or [`end`][BehaviorContext::end]
//! the behavior.  Continuations of a deactivated behavior are dropped.

use std::collections::BTreeSet;
use std::fmt;

use botcore_actions::{Action, ActionQueue, Host, QueueError, QueuePosition, WorldView};
use botcore_kernel::{ReactionLockError, ReactionLockManager, Whiteboard, WhiteboardError};
use botcore_types::{
    ActionResult, ActionTag, BehaviorId, CoreError, Event, EventPayload, EventTag,
    ReactionTrigger,
};
use thiserror::Error;
use tracing::{debug, info};

use crate::score::ScoreLedger;

// ─────────────────────────────────────────────────────────────────────────────
// Contract
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BehaviorStatus {
    Running,
    Complete,
}

/// Event tags a behavior wants delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSubscriptions {
    /// Delivered only while the behavior is active.
    pub while_running: BTreeSet<EventTag>,
    /// Delivered whether or not the behavior is active.
    pub always: BTreeSet<EventTag>,
}

impl EventSubscriptions {
    pub fn while_running(tags: impl IntoIterator<Item = EventTag>) -> Self {
        Self {
            while_running: tags.into_iter().collect(),
            always: BTreeSet::new(),
        }
    }

    pub fn and_always(mut self, tags: impl IntoIterator<Item = EventTag>) -> Self {
        self.always.extend(tags);
        self
    }

    pub fn wants(&self, tag: EventTag, running: bool) -> bool {
        self.always.contains(&tag) || (running && self.while_running.contains(&tag))
    }
}

#[derive(Debug, Error)]
pub enum BehaviorError {
    #[error("{behavior} is already acting ({tag})")]
    AlreadyActing { behavior: String, tag: ActionTag },
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    ReactionLock(#[from] ReactionLockError),
    #[error(transparent)]
    Whiteboard(#[from] WhiteboardError),
    #[error(transparent)]
    Config(#[from] CoreError),
    /// The activation predicate held but the world changed before the
    /// behavior could start.
    #[error("cannot start: {0}")]
    NotReady(String),
}

/// A goal-directed controller selected by the arbiter.
///
/// Only [`wants_to_run`][Behavior::wants_to_run] and
/// [`on_activated`][Behavior::on_activated] are required.  The default
/// [`update`][Behavior::update] keeps the behavior running while it has an
/// action in flight and completes it otherwise.
pub trait Behavior: Sized + 'static {
    fn name(&self) -> &str;

    /// The reflex this behavior implements, if it is one.  A suppressed
    /// reflex is neither eligible nor handed the events that trigger it.
    fn reaction_trigger(&self) -> Option<ReactionTrigger> {
        None
    }

    fn subscriptions(&self) -> EventSubscriptions {
        EventSubscriptions::default()
    }

    fn handle_event(&mut self, _event: &Event, _world: &dyn WorldView, _running: bool) {}

    /// Activation predicate, evaluated every tick while inactive.  May
    /// refresh cached fields but must not act.
    fn wants_to_run(&mut self, world: &dyn WorldView, whiteboard: &Whiteboard, tick: u64) -> bool;

    fn on_activated(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> Result<(), BehaviorError>;

    fn update(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> BehaviorStatus {
        if ctx.is_acting() {
            BehaviorStatus::Running
        } else {
            BehaviorStatus::Complete
        }
    }

    /// Called before the arbiter cancels the behavior's action and releases
    /// what it holds.  Actions queued here are cancelled too.
    fn on_deactivated(&mut self, _ctx: &mut BehaviorContext<'_, Self>) {}
}

/// The reflex an event would fire.
pub fn reaction_trigger_for(payload: &EventPayload) -> ReactionTrigger {
    match payload {
        EventPayload::ObjectObserved { .. } => ReactionTrigger::ObjectPositionUpdated,
        EventPayload::ObjectMoved { .. } => ReactionTrigger::CubeMoved,
        EventPayload::ObjectStacked { .. } => ReactionTrigger::StackOfCubesInitialDetection,
        EventPayload::FaceObserved { .. } => ReactionTrigger::FacePositionUpdated,
        EventPayload::RobotPickedUp => ReactionTrigger::RobotPickedUp,
        EventPayload::CliffDetected => ReactionTrigger::CliffDetected,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Arbiter-owned state lent to behaviors
// ─────────────────────────────────────────────────────────────────────────────

/// Cross-behavior tables owned by the arbiter.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) reactions: ReactionLockManager,
    pub(crate) whiteboard: Whiteboard,
    pub(crate) ledger: ScoreLedger,
}

/// Everything a behavior call may reach for one tick.
pub(crate) struct Env<'a> {
    pub(crate) host: Host<'a>,
    pub(crate) queue: &'a mut ActionQueue,
    pub(crate) shared: &'a mut Shared,
}

impl<'a> Env<'a> {
    pub(crate) fn new(
        host: &'a mut Host<'_>,
        queue: &'a mut ActionQueue,
        shared: &'a mut Shared,
    ) -> Self {
        Self {
            host: Host::new(host.world, &mut *host.commands, host.tick),
            queue,
            shared,
        }
    }

    pub(crate) fn reborrow(&mut self) -> Env<'_> {
        Env {
            host: Host::new(self.host.world, &mut *self.host.commands, self.host.tick),
            queue: &mut *self.queue,
            shared: &mut *self.shared,
        }
    }
}

pub type Continuation<B> = Box<dyn FnOnce(&mut B, ActionResult, &mut BehaviorContext<'_, B>)>;

/// Per-activation bookkeeping of one behavior.
pub(crate) struct Activity<B> {
    pub(crate) acting: Option<ActionTag>,
    pub(crate) continuations: Vec<(ActionTag, Continuation<B>)>,
    pub(crate) state: Option<String>,
    pub(crate) end_requested: bool,
}

impl<B> Default for Activity<B> {
    fn default() -> Self {
        Self {
            acting: None,
            continuations: Vec::new(),
            state: None,
            end_requested: false,
        }
    }
}

impl<B> Activity<B> {
    pub(crate) fn take_continuation(&mut self, tag: ActionTag) -> Option<Continuation<B>> {
        let index = self.continuations.iter().position(|(t, _)| *t == tag)?;
        Some(self.continuations.swap_remove(index).1)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BehaviorContext
// ─────────────────────────────────────────────────────────────────────────────

/// A behavior's handle on the robot for the duration of one call.
pub struct BehaviorContext<'a, B> {
    id: BehaviorId,
    name: &'a str,
    env: Env<'a>,
    activity: &'a mut Activity<B>,
}

impl<'a, B: Behavior> BehaviorContext<'a, B> {
    pub(crate) fn new(
        id: BehaviorId,
        name: &'a str,
        env: Env<'a>,
        activity: &'a mut Activity<B>,
    ) -> Self {
        Self {
            id,
            name,
            env,
            activity,
        }
    }

    pub fn id(&self) -> BehaviorId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.name
    }

    pub fn tick(&self) -> u64 {
        self.env.host.tick
    }

    pub fn world(&self) -> &dyn WorldView {
        self.env.host.world
    }

    pub fn whiteboard(&self) -> &Whiteboard {
        &self.env.shared.whiteboard
    }

    pub fn whiteboard_mut(&mut self) -> &mut Whiteboard {
        &mut self.env.shared.whiteboard
    }

    // -------------------------------------------------------------------------
    // Acting
    // -------------------------------------------------------------------------

    pub fn is_acting(&self) -> bool {
        self.activity.acting.is_some()
    }

    pub fn acting_tag(&self) -> Option<ActionTag> {
        self.activity.acting
    }

    /// Queue `action` with no continuation.
    pub fn start_acting(&mut self, action: Action) -> Result<ActionTag, BehaviorError> {
        self.queue_action(action, None)
    }

    /// Queue `action` and run `then` once it terminates.
    pub fn start_acting_then(
        &mut self,
        action: Action,
        then: impl FnOnce(&mut B, ActionResult, &mut BehaviorContext<'_, B>) + 'static,
    ) -> Result<ActionTag, BehaviorError> {
        self.queue_action(action, Some(Box::new(then)))
    }

    fn queue_action(
        &mut self,
        action: Action,
        then: Option<Continuation<B>>,
    ) -> Result<ActionTag, BehaviorError> {
        if let Some(tag) = self.activity.acting {
            return Err(BehaviorError::AlreadyActing {
                behavior: self.name.to_string(),
                tag,
            });
        }
        let action_name = action.name().to_string();
        let tag = self
            .env
            .queue
            .queue(action, QueuePosition::Now, &mut self.env.host)?;
        self.activity.acting = Some(tag);
        if let Some(then) = then {
            self.activity.continuations.push((tag, then));
        }
        debug!(behavior = %self.name, %tag, action = %action_name, "started acting");
        Ok(tag)
    }

    /// Cancel the current action and forget its continuation.  Returns
    /// `false` when nothing was running.
    pub fn stop_acting(&mut self) -> bool {
        let Some(tag) = self.activity.acting.take() else {
            return false;
        };
        self.activity.continuations.retain(|(t, _)| *t != tag);
        debug!(behavior = %self.name, %tag, "stopped acting");
        self.env.queue.cancel(tag, &mut self.env.host)
    }

    // -------------------------------------------------------------------------
    // Reactions
    // -------------------------------------------------------------------------

    /// Suppress `triggers` until re-enabled or until this behavior
    /// deactivates.
    pub fn disable_reactions(&mut self, triggers: &[ReactionTrigger]) -> Result<(), BehaviorError> {
        self.env.shared.reactions.acquire(self.id, triggers)?;
        Ok(())
    }

    pub fn reenable_reactions(&mut self, triggers: &[ReactionTrigger]) {
        self.env.shared.reactions.release(self.id, triggers);
    }

    pub fn reactions(&self) -> &ReactionLockManager {
        &self.env.shared.reactions
    }

    // -------------------------------------------------------------------------
    // Reporting
    // -------------------------------------------------------------------------

    /// Record the behavior's internal state.  Changes are logged.
    pub fn set_state(&mut self, state: impl fmt::Debug) {
        let name = format!("{state:?}");
        if self.activity.state.as_deref() != Some(name.as_str()) {
            info!(behavior = %self.name, state = %name, tick = self.tick(), "behavior state");
        }
        self.activity.state = Some(name);
    }

    pub fn state_name(&self) -> Option<&str> {
        self.activity.state.as_deref()
    }

    pub fn objective_achieved(&mut self, objective: &str, score: u32) {
        info!(behavior = %self.name, objective, score, "objective achieved");
        let tick = self.tick();
        self.env
            .shared
            .ledger
            .record(self.id, self.name, objective, score, tick);
    }

    /// Finish the behavior.  The arbiter deactivates it once the current
    /// call returns.
    pub fn end(&mut self) {
        self.activity.end_requested = true;
    }
}
