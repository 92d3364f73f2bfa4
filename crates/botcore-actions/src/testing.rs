//! In-crate fakes shared by the unit tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use botcore_kernel::TrackLockTable;
use botcore_types::{
    ActionResult, CommandId, FaceObservation, MotorCommand, ObjectHandle, ObjectId, Pose, TrackSet,
};

use crate::action::{Action, Primitive};
use crate::context::{ActionContext, CommandSink, Host, WorldView};

pub type Log = Rc<RefCell<Vec<String>>>;

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

#[derive(Default)]
pub struct FakeWorld {
    pub objects: Vec<ObjectHandle>,
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

    fn object_on_top_of(&self, _id: ObjectId, _tolerance_mm: f32) -> Option<ObjectHandle> {
        None
    }

    fn robot_pose(&self) -> Pose {
        self.robot.unwrap_or(Pose::new(0.0, 0.0, 0.0))
    }

    fn located_objects(&self) -> Vec<ObjectHandle> {
        self.objects.clone()
    }
}

/// Commands finish after `duration` polls.
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
            Some(0) => ActionResult::Success,
            Some(left) => {
                *left -= 1;
                if *left == 0 {
                    ActionResult::Success
                } else {
                    ActionResult::Running
                }
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

/// A primitive whose results are scripted up front.
pub struct Scripted {
    name: String,
    tracks: TrackSet,
    init: ActionResult,
    script: VecDeque<ActionResult>,
    log: Log,
}

impl Scripted {
    pub fn new(name: &str, tracks: TrackSet, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            tracks,
            init: ActionResult::Running,
            script: VecDeque::new(),
            log: Rc::clone(log),
        }
    }

    pub fn init_with(mut self, result: ActionResult) -> Self {
        self.init = result;
        self
    }

    /// Results returned by successive `check_if_done` calls.  Once the
    /// script runs out the last entry repeats.
    pub fn then(mut self, results: &[ActionResult]) -> Self {
        self.script = results.iter().copied().collect();
        self
    }

    pub fn action(self) -> Action {
        Action::from_primitive(self)
    }
}

impl Primitive for Scripted {
    fn name(&self) -> &str {
        &self.name
    }

    fn tracks(&self) -> TrackSet {
        self.tracks
    }

    fn init(&mut self, _ctx: &mut ActionContext<'_>) -> ActionResult {
        self.log.borrow_mut().push(format!("init:{}", self.name));
        self.init
    }

    fn check_if_done(&mut self, _ctx: &mut ActionContext<'_>) -> ActionResult {
        self.log.borrow_mut().push(format!("check:{}", self.name));
        if self.script.len() > 1 {
            self.script.pop_front().unwrap_or(ActionResult::Success)
        } else {
            self.script.front().copied().unwrap_or(ActionResult::Success)
        }
    }

    fn on_cancel(&mut self, _ctx: &mut ActionContext<'_>) {
        self.log.borrow_mut().push(format!("cancel:{}", self.name));
    }
}

/// World, sink and track table driving a single action by hand.
pub struct Rig {
    pub world: FakeWorld,
    pub sink: FakeSink,
    pub tracks: TrackLockTable,
    pub tick: u64,
}

impl Rig {
    pub fn new() -> Self {
        Self {
            world: FakeWorld::default(),
            sink: FakeSink::new(2),
            tracks: TrackLockTable::new(),
            tick: 0,
        }
    }

    pub fn update(&mut self, action: &mut Action) -> ActionResult {
        self.tick += 1;
        let mut ctx = ActionContext {
            world: &self.world,
            commands: &mut self.sink,
            tick: self.tick,
            tracks: &mut self.tracks,
        };
        action.update(&mut ctx, &[])
    }

    pub fn cancel(&mut self, action: &mut Action) {
        let mut ctx = ActionContext {
            world: &self.world,
            commands: &mut self.sink,
            tick: self.tick,
            tracks: &mut self.tracks,
        };
        action.cancel(&mut ctx);
    }

    /// Run `action` until it terminates, returning the result and how many
    /// ticks it took.
    pub fn run(&mut self, action: &mut Action, limit: u32) -> (ActionResult, u32) {
        for n in 1..=limit {
            let result = self.update(action);
            if result.is_terminal() {
                return (result, n);
            }
        }
        panic!("action did not finish within {limit} ticks");
    }

    pub fn host(&mut self) -> Host<'_> {
        self.tick += 1;
        Host::new(&self.world, &mut self.sink, self.tick)
    }
}
