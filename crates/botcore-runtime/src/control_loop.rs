//! [`ControlLoop`] – one robot's cooperative control cycle.
//!
//! Each call to [`ControlLoop::step`] runs, in order:
//!
//! 1. **Route** – world events drained from the bus go to subscribed
//!    behaviors.
//! 2. **Arbitrate** – [`BehaviorArbiter::tick`] updates, preempts and
//!    activates behaviors.
//! 3. **Act** – [`ActionQueue::tick`] advances every root action once.
//! 4. **Continue** – completed actions run their behavior's continuation.
//!
//! Nothing blocks; the host decides how often to call `step`.

use botcore_actions::{ActionQueue, CommandSink, CompletedAction, Host, WorldView};
use botcore_types::{BehaviorId, TrackSet};
use tracing::debug;

use crate::arbiter::BehaviorArbiter;
use crate::event_bus::{EventBus, EventReceiver};

/// What happened during one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub tick: u64,
    pub active: Option<BehaviorId>,
    pub active_name: Option<String>,
    pub state: Option<String>,
    pub events: usize,
    pub completed: Vec<CompletedAction>,
    pub locked_tracks: TrackSet,
}

pub struct ControlLoop {
    arbiter: BehaviorArbiter,
    queue: ActionQueue,
    events: Option<EventReceiver>,
    tick: u64,
}

impl ControlLoop {
    pub fn new(arbiter: BehaviorArbiter) -> Self {
        Self {
            arbiter,
            queue: ActionQueue::new(),
            events: None,
            tick: 0,
        }
    }

    /// Receive world events published on `bus`.
    pub fn with_event_bus(mut self, bus: &EventBus) -> Self {
        self.events = Some(bus.subscribe());
        self
    }

    /// Run one control cycle.
    pub fn step(&mut self, world: &dyn WorldView, commands: &mut dyn CommandSink) -> CycleReport {
        self.tick += 1;

        let events = self
            .events
            .as_mut()
            .map(EventReceiver::drain)
            .unwrap_or_default();
        for event in &events {
            self.arbiter.route_event(event, world);
        }

        let mut host = Host::new(world, commands, self.tick);
        let active = self.arbiter.tick(&mut host, &mut self.queue);
        let completed = self.queue.tick(&mut host);
        self.arbiter.dispatch(&completed, &mut host, &mut self.queue);

        debug!(
            tick = self.tick,
            events = events.len(),
            completed = completed.len(),
            tracks = %self.queue.locked_tracks(),
            "cycle"
        );
        CycleReport {
            tick: self.tick,
            active,
            active_name: self.arbiter.active_name().map(str::to_string),
            state: self.arbiter.active_state().map(str::to_string),
            events: events.len(),
            completed,
            locked_tracks: self.queue.locked_tracks(),
        }
    }

    /// Deactivate the running behavior and cancel every queued action.
    pub fn shutdown(&mut self, world: &dyn WorldView, commands: &mut dyn CommandSink) {
        let mut host = Host::new(world, commands, self.tick);
        self.arbiter.deactivate_all(&mut host, &mut self.queue);
        self.queue.cancel_all(&mut host);
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn arbiter(&self) -> &BehaviorArbiter {
        &self.arbiter
    }

    pub fn arbiter_mut(&mut self) -> &mut BehaviorArbiter {
        &mut self.arbiter
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }
}
