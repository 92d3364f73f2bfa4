//! [`BehaviorArbiter`] – chooses which behavior may run.
//!
//! Each tick the arbiter:
//!
//! 1. updates the active behavior and deactivates it if it completed;
//! 2. evaluates the activation predicate of every inactive behavior whose
//!    reflex is not suppressed;
//! 3. activates the best eligible behavior, preempting the active one when the
//!    candidate ranks higher.
//!
//! Rank is `(priority, registration order)`, lowest first.  Objective scores
//! never affect selection.
//!
//! Completed actions are handed back through [`BehaviorArbiter::dispatch`],
//! which runs the owning behavior's continuation.
//!
//! | Lifecycle | Meaning |
//! |-----------|---------|
//! | `Inactive` | predicate evaluated every tick |
//! | `Activating` | inside `on_activated` |
//! | `Active` | updated every tick, continuations run |
//! | `Deactivating` | inside `on_deactivated` and cleanup |

use std::fmt;

use botcore_actions::{ActionQueue, CompletedAction, Host, WorldView};
use botcore_kernel::{ReactionLockManager, Whiteboard};
use botcore_types::{BehaviorId, CoreError, Event, ReactionTrigger};
use tracing::{debug, info, instrument, warn};

use crate::behavior::{
    Activity, Behavior, BehaviorContext, BehaviorError, BehaviorStatus, Env, Shared,
    reaction_trigger_for,
};
use crate::score::ScoreLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Inactive,
    Activating,
    Active,
    Deactivating,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Lifecycle::Inactive => "inactive",
            Lifecycle::Activating => "activating",
            Lifecycle::Active => "active",
            Lifecycle::Deactivating => "deactivating",
        };
        f.write_str(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Type-erased registration
// ─────────────────────────────────────────────────────────────────────────────

trait Runner {
    fn id(&self) -> BehaviorId;
    fn name(&self) -> &str;
    fn rank(&self) -> (u32, BehaviorId);
    fn lifecycle(&self) -> Lifecycle;
    fn state_name(&self) -> Option<&str>;
    fn reaction_trigger(&self) -> Option<ReactionTrigger>;
    fn wants_to_run(&mut self, world: &dyn WorldView, whiteboard: &Whiteboard, tick: u64) -> bool;
    fn deliver(&mut self, event: &Event, world: &dyn WorldView);
    fn activate(&mut self, env: &mut Env<'_>) -> Result<(), BehaviorError>;
    fn update(&mut self, env: &mut Env<'_>) -> BehaviorStatus;
    fn complete(&mut self, done: &CompletedAction, env: &mut Env<'_>);
    fn wants_end(&self) -> bool;
    fn deactivate(&mut self, env: &mut Env<'_>);
}

struct Registered<B: Behavior> {
    id: BehaviorId,
    name: String,
    priority: u32,
    lifecycle: Lifecycle,
    activity: Activity<B>,
    behavior: B,
}

impl<B: Behavior> Registered<B> {
    /// Cancel the action, drop continuations, release reaction locks and
    /// activation-scoped whiteboard entries.
    fn teardown(&mut self, env: &mut Env<'_>) {
        if let Some(tag) = self.activity.acting.take() {
            env.queue.cancel(tag, &mut env.host);
        }
        self.activity.continuations.clear();
        let released = env.shared.reactions.release_all(self.id);
        let cleared = env.shared.whiteboard.clear_activation_entries(self.id);
        debug!(
            behavior = %self.name,
            released_locks = released.len(),
            cleared_entries = cleared,
            "behavior torn down"
        );
        self.activity.end_requested = false;
        self.lifecycle = Lifecycle::Inactive;
    }
}

impl<B: Behavior> Runner for Registered<B> {
    fn id(&self) -> BehaviorId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn rank(&self) -> (u32, BehaviorId) {
        (self.priority, self.id)
    }

    fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    fn state_name(&self) -> Option<&str> {
        self.activity.state.as_deref()
    }

    fn reaction_trigger(&self) -> Option<ReactionTrigger> {
        self.behavior.reaction_trigger()
    }

    fn wants_to_run(&mut self, world: &dyn WorldView, whiteboard: &Whiteboard, tick: u64) -> bool {
        self.behavior.wants_to_run(world, whiteboard, tick)
    }

    fn deliver(&mut self, event: &Event, world: &dyn WorldView) {
        let running = self.lifecycle == Lifecycle::Active;
        if self.behavior.subscriptions().wants(event.tag(), running) {
            self.behavior.handle_event(event, world, running);
        }
    }

    fn activate(&mut self, env: &mut Env<'_>) -> Result<(), BehaviorError> {
        self.lifecycle = Lifecycle::Activating;
        self.activity = Activity::default();
        let result = {
            let mut ctx =
                BehaviorContext::new(self.id, &self.name, env.reborrow(), &mut self.activity);
            self.behavior.on_activated(&mut ctx)
        };
        match result {
            Ok(()) => {
                self.lifecycle = Lifecycle::Active;
                info!(behavior = %self.name, tick = env.host.tick, "behavior activated");
                Ok(())
            }
            Err(err) => {
                warn!(behavior = %self.name, %err, "activation failed");
                self.teardown(env);
                Err(err)
            }
        }
    }

    fn update(&mut self, env: &mut Env<'_>) -> BehaviorStatus {
        if self.activity.end_requested {
            return BehaviorStatus::Complete;
        }
        let status = {
            let mut ctx =
                BehaviorContext::new(self.id, &self.name, env.reborrow(), &mut self.activity);
            self.behavior.update(&mut ctx)
        };
        if self.activity.end_requested {
            BehaviorStatus::Complete
        } else {
            status
        }
    }

    fn complete(&mut self, done: &CompletedAction, env: &mut Env<'_>) {
        if self.lifecycle != Lifecycle::Active {
            return;
        }
        if self.activity.acting == Some(done.root) {
            self.activity.acting = None;
        }
        let Some(then) = self.activity.take_continuation(done.root) else {
            return;
        };
        if !done.notify {
            return;
        }
        debug!(behavior = %self.name, tag = %done.tag, result = %done.result, "continuation");
        let mut ctx = BehaviorContext::new(self.id, &self.name, env.reborrow(), &mut self.activity);
        then(&mut self.behavior, done.result, &mut ctx);
    }

    fn wants_end(&self) -> bool {
        self.activity.end_requested
    }

    fn deactivate(&mut self, env: &mut Env<'_>) {
        if self.lifecycle == Lifecycle::Inactive {
            return;
        }
        self.lifecycle = Lifecycle::Deactivating;
        {
            let mut ctx =
                BehaviorContext::new(self.id, &self.name, env.reborrow(), &mut self.activity);
            self.behavior.on_deactivated(&mut ctx);
        }
        self.teardown(env);
        info!(behavior = %self.name, tick = env.host.tick, "behavior deactivated");
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BehaviorArbiter
// ─────────────────────────────────────────────────────────────────────────────

/// Owns every registered behavior plus the reaction-lock table, the
/// whiteboard and the score ledger.
#[derive(Default)]
pub struct BehaviorArbiter {
    runners: Vec<Box<dyn Runner>>,
    active: Option<usize>,
    shared: Shared,
}

impl BehaviorArbiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `behavior` with `priority` (lower runs first).
    pub fn register<B: Behavior>(&mut self, behavior: B, priority: u32) -> Result<BehaviorId, CoreError> {
        let index = u16::try_from(self.runners.len()).map_err(|_| CoreError::TooManyBehaviors {
            max: usize::from(u16::MAX) + 1,
        })?;
        let id = BehaviorId(index);
        let name = behavior.name().to_string();
        info!(behavior = %name, %id, priority, "behavior registered");
        self.runners.push(Box::new(Registered {
            id,
            name,
            priority,
            lifecycle: Lifecycle::Inactive,
            activity: Activity::default(),
            behavior,
        }));
        Ok(id)
    }

    /// Advance the arbitration by one tick.  Returns the active behavior.
    #[instrument(level = "debug", skip_all, fields(tick = host.tick))]
    pub fn tick(&mut self, host: &mut Host<'_>, queue: &mut ActionQueue) -> Option<BehaviorId> {
        let mut env = Env::new(host, queue, &mut self.shared);

        if let Some(i) = self.active {
            let runner = &mut self.runners[i];
            if runner.lifecycle() != Lifecycle::Active
                || runner.update(&mut env) == BehaviorStatus::Complete
            {
                runner.deactivate(&mut env);
                self.active = None;
            }
        }

        let floor = self.active.map(|i| self.runners[i].rank());
        let mut best: Option<(usize, (u32, BehaviorId))> = None;
        for (i, runner) in self.runners.iter_mut().enumerate() {
            if Some(i) == self.active || runner.lifecycle() != Lifecycle::Inactive {
                continue;
            }
            let suppressed = runner
                .reaction_trigger()
                .is_some_and(|t| env.shared.reactions.is_suppressed(t));
            if suppressed {
                continue;
            }
            if !runner.wants_to_run(env.host.world, &env.shared.whiteboard, env.host.tick) {
                continue;
            }
            let rank = runner.rank();
            if floor.is_some_and(|f| rank >= f) {
                continue;
            }
            if best.is_none_or(|(_, b)| rank < b) {
                best = Some((i, rank));
            }
        }

        if let Some((next, _)) = best {
            if let Some(current) = self.active.take() {
                info!(
                    from = %self.runners[current].name(),
                    to = %self.runners[next].name(),
                    "preempting"
                );
                self.runners[current].deactivate(&mut env);
            }
            if self.runners[next].activate(&mut env).is_ok() {
                self.active = Some(next);
            }
        }

        self.active.map(|i| self.runners[i].id())
    }

    /// Hand completed top-level actions to the active behavior's
    /// continuations.
    pub fn dispatch(
        &mut self,
        completed: &[CompletedAction],
        host: &mut Host<'_>,
        queue: &mut ActionQueue,
    ) {
        let Some(i) = self.active else {
            return;
        };
        let mut env = Env::new(host, queue, &mut self.shared);
        let runner = &mut self.runners[i];
        for done in completed {
            runner.complete(done, &mut env);
        }
        if runner.wants_end() {
            runner.deactivate(&mut env);
            self.active = None;
        }
    }

    /// Route a world event to every subscribed behavior.  A suppressed
    /// reflex does not hear the events that would trigger it.
    pub fn route_event(&mut self, event: &Event, world: &dyn WorldView) {
        let trigger = reaction_trigger_for(&event.payload);
        let suppressed = self.shared.reactions.is_suppressed(trigger);
        for runner in &mut self.runners {
            if suppressed && runner.reaction_trigger() == Some(trigger) {
                debug!(behavior = %runner.name(), %trigger, "event suppressed");
                continue;
            }
            runner.deliver(event, world);
        }
    }

    /// Deactivate whatever is running.
    pub fn deactivate_all(&mut self, host: &mut Host<'_>, queue: &mut ActionQueue) {
        if let Some(i) = self.active.take() {
            let mut env = Env::new(host, queue, &mut self.shared);
            self.runners[i].deactivate(&mut env);
        }
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn active(&self) -> Option<BehaviorId> {
        self.active.map(|i| self.runners[i].id())
    }

    pub fn active_name(&self) -> Option<&str> {
        self.active.map(|i| self.runners[i].name())
    }

    /// Debug name of the active behavior's internal state.
    pub fn active_state(&self) -> Option<&str> {
        self.active.and_then(|i| self.runners[i].state_name())
    }

    pub fn lifecycle(&self, id: BehaviorId) -> Option<Lifecycle> {
        self.runner(id).map(|r| r.lifecycle())
    }

    pub fn id_of(&self, name: &str) -> Option<BehaviorId> {
        self.runners.iter().find(|r| r.name() == name).map(|r| r.id())
    }

    pub fn name_of(&self, id: BehaviorId) -> Option<&str> {
        self.runner(id).map(|r| r.name())
    }

    pub fn len(&self) -> usize {
        self.runners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runners.is_empty()
    }

    pub fn reaction_locks(&self) -> &ReactionLockManager {
        &self.shared.reactions
    }

    pub fn whiteboard(&self) -> &Whiteboard {
        &self.shared.whiteboard
    }

    pub fn whiteboard_mut(&mut self) -> &mut Whiteboard {
        &mut self.shared.whiteboard
    }

    pub fn ledger(&self) -> &ScoreLedger {
        &self.shared.ledger
    }

    fn runner(&self, id: BehaviorId) -> Option<&dyn Runner> {
        self.runners.get(usize::from(id.0)).map(|r| r.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use botcore_types::ReactionTrigger;

    use super::*;
    use crate::behaviors::LookAround;
    use crate::testing::{Harness, Stub, entries, log};

    #[test]
    fn registration_fails_once_ids_run_out() {
        let mut arbiter = BehaviorArbiter::new();
        for _ in 0..=u16::MAX {
            arbiter.register(LookAround::default(), 0).unwrap();
        }
        let err = arbiter.register(LookAround::default(), 0).unwrap_err();
        assert_eq!(err, CoreError::TooManyBehaviors { max: 65_536 });
        assert_eq!(arbiter.id_of("look_around"), Some(BehaviorId(0)));
    }

    #[test]
    fn higher_priority_preempts_at_first_eligible_tick() {
        let log = log();
        let mut h = Harness::new(1);
        let b1 = h.arbiter.register(Stub::new("b1", &log), 1).unwrap();
        let b2 = h.arbiter.register(Stub::new("b2", &log).eligible_from(3), 0).unwrap();

        h.step();
        h.step();
        assert_eq!(h.arbiter.active(), Some(b1));

        h.step();
        assert_eq!(h.arbiter.active(), Some(b2));
        assert_eq!(h.arbiter.lifecycle(b1), Some(Lifecycle::Inactive));
        assert_eq!(
            entries(&log),
            ["b1:activated@1", "b1:deactivated@3", "b2:activated@3"]
        );

        // b1's cancelled wait never reaches its continuation.
        for _ in 0..5 {
            h.step();
        }
        assert!(!entries(&log).iter().any(|e| e.starts_with("b1:done")));
        assert_eq!(h.arbiter.active(), Some(b2));
    }

    #[test]
    fn equal_priority_goes_to_registration_order() {
        let log = log();
        let mut h = Harness::new(1);
        let first = h.arbiter.register(Stub::new("first", &log), 0).unwrap();
        h.arbiter.register(Stub::new("second", &log), 0).unwrap();

        h.step();
        assert_eq!(h.arbiter.active(), Some(first));
        h.step();
        assert_eq!(entries(&log), ["first:activated@1"]);
    }

    #[test]
    fn lower_priority_never_preempts() {
        let log = log();
        let mut h = Harness::new(1);
        let high = h.arbiter.register(Stub::new("high", &log), 0).unwrap();
        h.arbiter.register(Stub::new("low", &log), 5).unwrap();

        for _ in 0..4 {
            h.step();
        }
        assert_eq!(h.arbiter.active(), Some(high));
        assert_eq!(entries(&log), ["high:activated@1"]);
    }

    #[test]
    fn reaction_locks_are_released_on_preemption() {
        let log = log();
        let mut h = Harness::new(1);
        let locker = h.arbiter.register(
            Stub::new("locker", &log)
                .suppressing(&[ReactionTrigger::CubeMoved, ReactionTrigger::CliffDetected]),
            1,
        ).unwrap();
        h.arbiter.register(Stub::new("boss", &log).eligible_from(2), 0).unwrap();

        h.step();
        assert!(h.arbiter.reaction_locks().is_suppressed(ReactionTrigger::CubeMoved));
        assert_eq!(h.arbiter.reaction_locks().held_by(locker).len(), 2);

        h.step();
        for trigger in ReactionTrigger::ALL {
            assert!(!h.arbiter.reaction_locks().is_suppressed(trigger));
        }
        assert!(h.arbiter.reaction_locks().held_by(locker).is_empty());
    }

    #[test]
    fn failed_activation_releases_everything() {
        let log = log();
        let mut h = Harness::new(1);
        let id = h.arbiter.register(
            Stub::new("broken", &log)
                .suppressing(&[ReactionTrigger::CubeMoved])
                .failing_activation(),
            0,
        ).unwrap();

        h.step();
        assert_eq!(h.arbiter.active(), None);
        assert_eq!(h.arbiter.lifecycle(id), Some(Lifecycle::Inactive));
        assert!(!h.arbiter.reaction_locks().is_suppressed(ReactionTrigger::CubeMoved));
        assert!(h.queue.is_empty());
        assert!(h.queue.locked_tracks().is_empty());
        // on_deactivated is only for behaviors that became active.
        assert_eq!(entries(&log), ["broken:activated@1"]);
    }

    #[test]
    fn continuations_chain_then_behavior_completes() {
        let log = log();
        let mut h = Harness::new(1);
        let eligible = Rc::new(Cell::new(true));
        h.arbiter.register(
            Stub::new("chain", &log)
                .switched(&eligible)
                .action_ticks(1)
                .chained(2),
            0,
        ).unwrap();

        h.step();
        eligible.set(false);
        assert!(h.run_until(20, |h| h.arbiter.active().is_none()));

        let log = entries(&log);
        assert_eq!(log[0], "chain:activated@1");
        assert_eq!(
            &log[1..4],
            ["chain:done:success", "chain:done:success", "chain:done:success"]
        );
        assert!(log[4].starts_with("chain:deactivated@"));
        assert_eq!(log.len(), 5);
    }

    #[test]
    fn suppressed_reflex_is_not_eligible() {
        let log = log();
        let mut h = Harness::new(1);
        let reflex_ready = Rc::new(Cell::new(false));
        let holder_on = Rc::new(Cell::new(true));
        let reflex = h.arbiter.register(
            Stub::new("reflex", &log)
                .reflex(ReactionTrigger::CubeMoved)
                .switched(&reflex_ready),
            0,
        ).unwrap();
        let holder = h.arbiter.register(
            Stub::new("holder", &log)
                .switched(&holder_on)
                .action_ticks(1)
                .chained(u32::MAX)
                .suppressing(&[ReactionTrigger::CubeMoved]),
            1,
        ).unwrap();

        h.step();
        assert_eq!(h.arbiter.active(), Some(holder));
        reflex_ready.set(true);
        h.step();
        h.step();
        assert_eq!(h.arbiter.active(), Some(holder));

        // Stop the holder; once its locks are gone the reflex may run.
        holder_on.set(false);
        h.arbiter.deactivate_all(
            &mut Host::new(&h.world, &mut h.sink, h.tick),
            &mut h.queue,
        );
        h.step();
        assert_eq!(h.arbiter.active(), Some(reflex));
    }

    #[test]
    fn scores_do_not_influence_selection() {
        let log = log();
        let mut h = Harness::new(1);
        let scorer = h.arbiter.register(Stub::new("scorer", &log).scoring(1_000), 1).unwrap();
        let quiet = h.arbiter.register(Stub::new("quiet", &log).eligible_from(2), 0).unwrap();

        h.step();
        assert_eq!(h.arbiter.active(), Some(scorer));
        assert_eq!(h.arbiter.ledger().total_for(scorer), 1_000);

        h.step();
        assert_eq!(h.arbiter.active(), Some(quiet));
        assert_eq!(h.arbiter.ledger().total_for(quiet), 0);
    }

    #[test]
    fn deactivate_all_runs_cleanup() {
        let log = log();
        let mut h = Harness::new(1);
        h.arbiter
            .register(Stub::new("only", &log).suppressing(&[ReactionTrigger::Sparked]), 0).unwrap();
        h.step();

        h.arbiter.deactivate_all(
            &mut Host::new(&h.world, &mut h.sink, h.tick),
            &mut h.queue,
        );
        assert_eq!(h.arbiter.active(), None);
        assert!(h.queue.is_empty());
        assert!(!h.arbiter.reaction_locks().is_suppressed(ReactionTrigger::Sparked));
        assert_eq!(entries(&log).last().map(String::as_str), Some("only:deactivated@1"));
    }

    #[test]
    fn lifecycle_display() {
        assert_eq!(Lifecycle::Deactivating.to_string(), "deactivating");
        let arbiter = BehaviorArbiter::new();
        assert!(arbiter.is_empty());
        assert_eq!(arbiter.active_name(), None);
    }
}
