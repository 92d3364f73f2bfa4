//! Fakes shared by the runtime unit tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use botcore_actions::primitives::wait_ticks;
use botcore_actions::{ActionQueue, CommandSink, CompletedAction, Host, WorldView};
use botcore_kernel::Whiteboard;
use botcore_types::{
    ActionResult, CommandId, Event, EventPayload, FaceObservation, MotorCommand, ObjectHandle,
    ObjectId, ObjectOrientation, Pose, ReactionTrigger,
};

use crate::arbiter::BehaviorArbiter;
use crate::behavior::{Behavior, BehaviorContext, BehaviorError};

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

// ─────────────────────────────────────────────────────────────────────────────
// World and motors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeWorld {
    pub objects: Vec<ObjectHandle>,
    /// `(bottom, top)` pairs.
    pub stacks: Vec<(ObjectId, ObjectId)>,
    pub robot: Option<Pose>,
    pub face: Option<FaceObservation>,
}

impl WorldView for FakeWorld {
    fn located_object(&self, id: ObjectId) -> Option<ObjectHandle> {
        self.objects.iter().copied().find(|o| o.id == id)
    }

    fn last_observed_face(&self) -> Option<FaceObservation> {
        self.face
    }

    fn object_on_top_of(&self, id: ObjectId, _tolerance_mm: f32) -> Option<ObjectHandle> {
        let (_, top) = self.stacks.iter().find(|(bottom, _)| *bottom == id)?;
        self.located_object(*top)
    }

    fn robot_pose(&self) -> Pose {
        self.robot.unwrap_or(Pose::new(0.0, 0.0, 0.0))
    }

    fn located_objects(&self) -> Vec<ObjectHandle> {
        self.objects.clone()
    }
}

/// Commands succeed after `duration` polls.
pub struct FakeSink {
    pub duration: u32,
    pub issued: Vec<MotorCommand>,
    pub aborted: Vec<CommandId>,
    remaining: HashMap<CommandId, u32>,
    next: u64,
}

impl FakeSink {
    pub fn new(duration: u32) -> Self {
        Self {
            duration,
            issued: Vec::new(),
            aborted: Vec::new(),
            remaining: HashMap::new(),
            next: 0,
        }
    }
}

impl CommandSink for FakeSink {
    fn issue(&mut self, command: MotorCommand) -> CommandId {
        self.next += 1;
        let id = CommandId(self.next);
        self.issued.push(command);
        self.remaining.insert(id, self.duration);
        id
    }

    fn poll(&mut self, id: CommandId) -> ActionResult {
        match self.remaining.get_mut(&id) {
            Some(left) if *left <= 1 => {
                *left = 0;
                ActionResult::Success
            }
            Some(left) => {
                *left -= 1;
                ActionResult::Running
            }
            None => ActionResult::ABORT,
        }
    }

    fn abort(&mut self, id: CommandId) {
        if self.remaining.remove(&id).is_some() {
            self.aborted.push(id);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

/// Arbiter, queue, world and sink stepped together the way
/// [`ControlLoop`][crate::ControlLoop] does.
///
/// Drives teleport the robot to their target, flips roll a block a quarter
/// turn toward upright, and a forward straight drive can be told to topple
/// the stack on a given block.
pub struct Harness {
    pub arbiter: BehaviorArbiter,
    pub queue: ActionQueue,
    pub world: FakeWorld,
    pub sink: FakeSink,
    pub tick: u64,
    pub topple_on_straight_drive: Option<ObjectId>,
    events: Vec<Event>,
    applied: usize,
}

impl Harness {
    pub fn new(command_duration: u32) -> Self {
        Self {
            arbiter: BehaviorArbiter::new(),
            queue: ActionQueue::new(),
            world: FakeWorld::default(),
            sink: FakeSink::new(command_duration),
            tick: 0,
            topple_on_straight_drive: None,
            events: Vec::new(),
            applied: 0,
        }
    }

    /// Deliver `payload` at the start of the next step.
    pub fn publish(&mut self, payload: EventPayload) {
        self.events.push(Event::new("harness", payload));
    }

    pub fn step(&mut self) -> Vec<CompletedAction> {
        self.tick += 1;
        for event in std::mem::take(&mut self.events) {
            self.arbiter.route_event(&event, &self.world);
        }
        let mut host = Host::new(&self.world, &mut self.sink, self.tick);
        self.arbiter.tick(&mut host, &mut self.queue);
        let completed = self.queue.tick(&mut host);
        self.arbiter.dispatch(&completed, &mut host, &mut self.queue);
        self.apply_commands();
        completed
    }

    /// Step until `done` holds, at most `max_steps` times.
    pub fn run_until(&mut self, max_steps: usize, mut done: impl FnMut(&Harness) -> bool) -> bool {
        for _ in 0..max_steps {
            self.step();
            if done(self) {
                return true;
            }
        }
        false
    }

    fn apply_commands(&mut self) {
        for command in &self.sink.issued[self.applied..] {
            match command {
                MotorCommand::DriveToPose { pose } => self.world.robot = Some(*pose),
                MotorCommand::FlipObject { object } => {
                    if let Some(block) = self.world.objects.iter_mut().find(|o| o.id == *object) {
                        block.orientation = match block.orientation {
                            ObjectOrientation::UpsideDown => ObjectOrientation::OnSide,
                            _ => ObjectOrientation::Upright,
                        };
                    }
                }
                MotorCommand::DriveStraight { distance_mm, .. } if *distance_mm > 0.0 => {
                    if let Some(bottom) = self.topple_on_straight_drive {
                        self.world.stacks.retain(|(b, _)| *b != bottom);
                    }
                }
                _ => {}
            }
        }
        self.applied = self.sink.issued.len();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stub behavior
// ─────────────────────────────────────────────────────────────────────────────

/// A behavior that logs its lifecycle and waits `action_ticks` per action.
pub struct Stub {
    name: &'static str,
    log: Log,
    eligible_from: u64,
    switch: Option<Rc<Cell<bool>>>,
    reflex: Option<ReactionTrigger>,
    suppress: Vec<ReactionTrigger>,
    fail_activation: bool,
    action_ticks: u64,
    chain: u32,
    score: Option<u32>,
}

impl Stub {
    pub fn new(name: &'static str, log: &Log) -> Self {
        Self {
            name,
            log: Rc::clone(log),
            eligible_from: 0,
            switch: None,
            reflex: None,
            suppress: Vec::new(),
            fail_activation: false,
            action_ticks: 100,
            chain: 0,
            score: None,
        }
    }

    pub fn eligible_from(mut self, tick: u64) -> Self {
        self.eligible_from = tick;
        self
    }

    /// Eligible only while `switch` is set.
    pub fn switched(mut self, switch: &Rc<Cell<bool>>) -> Self {
        self.switch = Some(Rc::clone(switch));
        self
    }

    pub fn reflex(mut self, trigger: ReactionTrigger) -> Self {
        self.reflex = Some(trigger);
        self
    }

    pub fn suppressing(mut self, triggers: &[ReactionTrigger]) -> Self {
        self.suppress = triggers.to_vec();
        self
    }

    /// Queue an action and lock reactions, then fail the activation.
    pub fn failing_activation(mut self) -> Self {
        self.fail_activation = true;
        self
    }

    pub fn action_ticks(mut self, ticks: u64) -> Self {
        self.action_ticks = ticks;
        self
    }

    /// Queue `links` further actions from continuations before finishing.
    pub fn chained(mut self, links: u32) -> Self {
        self.chain = links;
        self
    }

    /// Report `points` for "stub_goal" on every activation.
    pub fn scoring(mut self, points: u32) -> Self {
        self.score = Some(points);
        self
    }

    fn record(&self, what: impl std::fmt::Display) {
        self.log.borrow_mut().push(format!("{}:{what}", self.name));
    }

    fn act(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> Result<(), BehaviorError> {
        ctx.start_acting_then(wait_ticks(self.action_ticks), |this, result, ctx| {
            this.record(format_args!("done:{result}"));
            if this.chain > 0 {
                this.chain -= 1;
                if let Err(err) = this.act(ctx) {
                    this.record(format_args!("error:{err}"));
                }
            }
        })?;
        Ok(())
    }
}

impl Behavior for Stub {
    fn name(&self) -> &str {
        self.name
    }

    fn reaction_trigger(&self) -> Option<ReactionTrigger> {
        self.reflex
    }

    fn wants_to_run(&mut self, _world: &dyn WorldView, _whiteboard: &Whiteboard, tick: u64) -> bool {
        tick >= self.eligible_from && self.switch.as_ref().is_none_or(|s| s.get())
    }

    fn on_activated(&mut self, ctx: &mut BehaviorContext<'_, Self>) -> Result<(), BehaviorError> {
        self.record(format_args!("activated@{}", ctx.tick()));
        if let Some(points) = self.score {
            ctx.objective_achieved("stub_goal", points);
        }
        if !self.suppress.is_empty() {
            ctx.disable_reactions(&self.suppress)?;
        }
        self.act(ctx)?;
        if self.fail_activation {
            return Err(BehaviorError::NotReady("told to fail".into()));
        }
        Ok(())
    }

    fn on_deactivated(&mut self, ctx: &mut BehaviorContext<'_, Self>) {
        self.record(format_args!("deactivated@{}", ctx.tick()));
    }
}
