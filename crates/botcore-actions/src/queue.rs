//! [`ActionQueue`] – the robot's set of running top-level actions.
//!
//! Actions live in numbered slots.  Slot 0 is the main sequential queue;
//! every [`QueuePosition::InParallel`] request opens a fresh slot that is
//! dropped once it empties.  Each tick advances the head of every slot once;
//! an action queued behind a finished head starts on the following tick.
//!
//! | Position | Effect |
//! |----------|--------|
//! | `Now` | cancel the main head (and any parallel root on the same tracks), run first |
//! | `NowAndClearRemaining` | like `Now`, but cancel the whole main slot |
//! | `Next` | run right after the current main head; refused if a parallel root holds its tracks |
//! | `AtEnd` | append to the main slot; refused like `Next` |
//! | `InParallel` | new slot; refused if its tracks are in use |
//!
//! Admission is synchronous: [`ActionQueue::queue`] either returns the new
//! tag or a [`QueueError`].

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use botcore_kernel::TrackLockTable;
use botcore_types::{ActionResult, ActionTag, TrackSet};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::action::{Action, ActionPath};
use crate::context::{ActionContext, Host};

/// Identity of a queue slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl SlotId {
    pub const MAIN: SlotId = SlotId(0);
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "slot{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePosition {
    Now,
    NowAndClearRemaining,
    Next,
    AtEnd,
    InParallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("action {0} is already queued")]
    DuplicateTag(ActionTag),
    #[error("tracks {tracks} are in use by another root action")]
    TracksInUse { tracks: TrackSet },
}

/// A top-level action that left the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedAction {
    /// Completion tag (the proxied child's tag for proxying compounds).
    pub tag: ActionTag,
    /// The root action's own tag.
    pub root: ActionTag,
    pub name: String,
    pub slot: SlotId,
    pub result: ActionResult,
    /// Whether the queuing behavior should be told.
    pub notify: bool,
}

impl CompletedAction {
    fn from_action(slot: SlotId, action: &Action) -> Self {
        Self {
            tag: action.completion_tag(),
            root: action.tag(),
            name: action.name().to_string(),
            slot,
            result: action.completion_result(),
            notify: action.options().emit_completion,
        }
    }
}

/// Owns every running top-level action and the track lock table.
pub struct ActionQueue {
    slots: BTreeMap<SlotId, VecDeque<Action>>,
    next_slot: u32,
    tracks: TrackLockTable,
    /// Cancellations since the last tick, reported with the next tick.
    pending: Vec<CompletedAction>,
}

impl Default for ActionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ActionQueue {
    pub fn new() -> Self {
        let mut slots = BTreeMap::new();
        slots.insert(SlotId::MAIN, VecDeque::new());
        Self {
            slots,
            next_slot: 0,
            tracks: TrackLockTable::new(),
            pending: Vec::new(),
        }
    }

    /// Admit `action` at `position`.
    pub fn queue(
        &mut self,
        action: Action,
        position: QueuePosition,
        host: &mut Host<'_>,
    ) -> Result<ActionTag, QueueError> {
        let tag = action.tag();
        if self.contains(tag) {
            return Err(QueueError::DuplicateTag(tag));
        }
        let tracks = action.required_tracks();

        let slot = match position {
            QueuePosition::Now | QueuePosition::NowAndClearRemaining => {
                let evict = if position == QueuePosition::Now {
                    usize::from(!self.main().is_empty())
                } else {
                    self.main().len()
                };
                for _ in 0..evict {
                    self.cancel_at(SlotId::MAIN, 0, host);
                }
                self.evict_parallel(tracks, host);
                self.main_mut().push_front(action);
                SlotId::MAIN
            }
            QueuePosition::Next => {
                self.admit_behind_main(tracks)?;
                let main = self.main_mut();
                let at = main.len().min(1);
                main.insert(at, action);
                SlotId::MAIN
            }
            QueuePosition::AtEnd => {
                self.admit_behind_main(tracks)?;
                self.main_mut().push_back(action);
                SlotId::MAIN
            }
            QueuePosition::InParallel => {
                let busy = self.busy_tracks() & tracks;
                if !busy.is_empty() {
                    return Err(QueueError::TracksInUse { tracks: busy });
                }
                self.next_slot += 1;
                let slot = SlotId(self.next_slot);
                self.slots.insert(slot, VecDeque::from([action]));
                slot
            }
        };
        info!(%tag, ?position, %slot, %tracks, "action queued");
        Ok(tag)
    }

    /// Advance the head of every slot once.  Returns every top-level action
    /// that finished this tick or was cancelled since the last one.
    #[instrument(level = "debug", skip_all, fields(tick = host.tick))]
    pub fn tick(&mut self, host: &mut Host<'_>) -> Vec<CompletedAction> {
        let mut done = std::mem::take(&mut self.pending);
        let mut ctx = ActionContext {
            world: host.world,
            commands: &mut *host.commands,
            tick: host.tick,
            tracks: &mut self.tracks,
        };

        for (slot, queue) in self.slots.iter_mut() {
            let Some(head) = queue.front_mut() else {
                continue;
            };
            if head.update(&mut ctx, &[]).is_terminal() {
                if let Some(finished) = queue.pop_front() {
                    debug!(tag = %finished.tag(), %slot, result = %finished.result(), "root finished");
                    done.push(CompletedAction::from_action(*slot, &finished));
                }
            }
        }
        self.drop_empty_slots();
        done
    }

    /// Cancel the action (root or descendant) identified by `tag`.
    ///
    /// Returns `false`, changing nothing, when the tag is unknown or already
    /// terminated.
    pub fn cancel(&mut self, tag: ActionTag, host: &mut Host<'_>) -> bool {
        let Some((slot, index, path)) = self.locate(tag) else {
            debug!(%tag, "cancel of unknown tag ignored");
            return false;
        };
        if path.is_root() {
            return self.cancel_at(slot, index, host);
        }

        let mut ctx = ActionContext {
            world: host.world,
            commands: &mut *host.commands,
            tick: host.tick,
            tracks: &mut self.tracks,
        };
        let Some(target) = self
            .slots
            .get_mut(&slot)
            .and_then(|q| q.get_mut(index))
            .and_then(|root| root.at_path_mut(&path))
        else {
            return false;
        };
        if target.state().is_terminated() {
            return false;
        }
        target.cancel(&mut ctx);
        true
    }

    /// Cancel everything in every slot.
    pub fn cancel_all(&mut self, host: &mut Host<'_>) {
        let slots: Vec<SlotId> = self.slots.keys().copied().collect();
        for slot in slots {
            while self.slots.get(&slot).is_some_and(|q| !q.is_empty()) {
                self.cancel_at(slot, 0, host);
            }
        }
        self.drop_empty_slots();
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    pub fn contains(&self, tag: ActionTag) -> bool {
        self.locate(tag).is_some()
    }

    pub fn find(&self, tag: ActionTag) -> Option<&Action> {
        self.slots
            .values()
            .flatten()
            .find_map(|root| root.find(tag))
    }

    /// Number of actions waiting or running in `slot`.
    pub fn queue_len(&self, slot: SlotId) -> usize {
        self.slots.get(&slot).map_or(0, VecDeque::len)
    }

    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.values().all(VecDeque::is_empty)
    }

    /// `true` when the head of any slot is named `name`.
    pub fn is_current(&self, name: &str) -> bool {
        self.heads().any(|a| a.name() == name)
    }

    /// Tags of every slot head, main slot first.
    pub fn current_tags(&self) -> Vec<ActionTag> {
        self.heads().map(Action::tag).collect()
    }

    pub fn locked_tracks(&self) -> TrackSet {
        self.tracks.locked_tracks()
    }

    pub fn track_table(&self) -> &TrackLockTable {
        &self.tracks
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn heads(&self) -> impl Iterator<Item = &Action> {
        self.slots.values().filter_map(VecDeque::front)
    }

    fn main(&self) -> &VecDeque<Action> {
        &self.slots[&SlotId::MAIN]
    }

    fn main_mut(&mut self) -> &mut VecDeque<Action> {
        self.slots.entry(SlotId::MAIN).or_default()
    }

    /// Tracks the current root actions hold or are about to claim.
    fn busy_tracks(&self) -> TrackSet {
        self.heads()
            .fold(self.tracks.locked_tracks(), |acc, a| acc | a.required_tracks())
    }

    fn parallel_tracks(&self) -> TrackSet {
        self.slots
            .iter()
            .filter(|(slot, _)| **slot != SlotId::MAIN)
            .flat_map(|(_, queue)| queue.iter())
            .fold(TrackSet::EMPTY, |acc, a| acc | a.required_tracks())
    }

    /// Main-slot actions wait for the main head, but nothing frees the
    /// tracks of a parallel root.
    fn admit_behind_main(&self, tracks: TrackSet) -> Result<(), QueueError> {
        let busy = self.parallel_tracks() & tracks;
        if busy.is_empty() {
            Ok(())
        } else {
            Err(QueueError::TracksInUse { tracks: busy })
        }
    }

    fn locate(&self, tag: ActionTag) -> Option<(SlotId, usize, ActionPath)> {
        self.slots.iter().find_map(|(slot, queue)| {
            queue
                .iter()
                .enumerate()
                .find_map(|(i, root)| root.locate(tag).map(|path| (*slot, i, path)))
        })
    }

    /// Cancel parallel roots whose tracks intersect `tracks`.
    fn evict_parallel(&mut self, tracks: TrackSet, host: &mut Host<'_>) {
        let clashing: Vec<SlotId> = self
            .slots
            .iter()
            .filter(|(slot, _)| **slot != SlotId::MAIN)
            .filter(|(_, q)| q.front().is_some_and(|a| a.required_tracks().intersects(tracks)))
            .map(|(slot, _)| *slot)
            .collect();
        for slot in clashing {
            while self.slots.get(&slot).is_some_and(|q| !q.is_empty()) {
                self.cancel_at(slot, 0, host);
            }
        }
        self.drop_empty_slots();
    }

    fn cancel_at(&mut self, slot: SlotId, index: usize, host: &mut Host<'_>) -> bool {
        let Some(mut action) = self.slots.get_mut(&slot).and_then(|q| q.remove(index)) else {
            return false;
        };
        let mut ctx = ActionContext {
            world: host.world,
            commands: &mut *host.commands,
            tick: host.tick,
            tracks: &mut self.tracks,
        };
        action.cancel(&mut ctx);
        self.pending.push(CompletedAction::from_action(slot, &action));
        self.drop_empty_slots();
        true
    }

    fn drop_empty_slots(&mut self) {
        self.slots
            .retain(|slot, q| *slot == SlotId::MAIN || !q.is_empty());
    }
}
