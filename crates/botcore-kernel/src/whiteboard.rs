//! [`Whiteboard`] – shared scratch state between behaviors.
//!
//! Behaviors coordinate through named entries instead of referencing each
//! other.  Every entry carries the [`BehaviorId`] of its single writer; any
//! other behavior trying to overwrite or clear it gets
//! [`WhiteboardError::NotOwner`].
//!
//! | Scope | Lifetime |
//! |-------|----------|
//! | [`EntryScope::Activation`] | cleared by the arbiter when the owner deactivates |
//! | [`EntryScope::Session`] | kept until explicitly cleared; may be adopted by another behavior |
//!
//! The whiteboard also remembers recent object-use failures so behaviors can
//! skip targets that just failed (for example an object with no reachable
//! approach pose).

use std::collections::{BTreeMap, VecDeque};

use botcore_types::{BehaviorId, ObjectId, Pose};
use thiserror::Error;
use tracing::debug;

// ─────────────────────────────────────────────────────────────────────────────
// Entries
// ─────────────────────────────────────────────────────────────────────────────

/// Names of the shared entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntryKey {
    /// A freshly built stack worth looking at.
    StackToAdmire,
    /// The block a behavior has committed to manipulating.
    TargetObject,
}

/// A two-block stack, bottom first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackToAdmire {
    pub bottom: ObjectId,
    pub top: ObjectId,
}

/// Value stored under an [`EntryKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryValue {
    Stack(StackToAdmire),
    Object(ObjectId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryScope {
    Activation,
    Session,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    owner: BehaviorId,
    scope: EntryScope,
    value: EntryValue,
}

/// Errors from owner-checked whiteboard writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WhiteboardError {
    #[error("{key:?} is owned by {owner}, not {requester}")]
    NotOwner {
        key: EntryKey,
        owner: BehaviorId,
        requester: BehaviorId,
    },
    #[error("{0:?} is activation-scoped and cannot be adopted")]
    NotAdoptable(EntryKey),
}

// ─────────────────────────────────────────────────────────────────────────────
// Object-use failures
// ─────────────────────────────────────────────────────────────────────────────

/// What a behavior was trying to do with an object when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObjectUse {
    PickUp,
    StackOn,
    PlaceAt,
    RollOrFlip,
}

impl ObjectUse {
    /// How many failures are remembered for this use before the oldest is
    /// forgotten.
    pub const fn capacity(self) -> usize {
        match self {
            ObjectUse::PlaceAt => 10,
            ObjectUse::PickUp | ObjectUse::StackOn | ObjectUse::RollOrFlip => 1,
        }
    }
}

/// One remembered failure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailureRecord {
    pub object: ObjectId,
    pub pose: Pose,
    pub tick: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Whiteboard
// ─────────────────────────────────────────────────────────────────────────────

/// Owner-checked shared state.
///
/// # Example
///
/// ```
/// use botcore_kernel::whiteboard::{EntryKey, EntryScope, EntryValue, Whiteboard};
/// use botcore_types::{BehaviorId, ObjectId};
///
/// let mut wb = Whiteboard::new();
/// let flipper = BehaviorId(0);
/// let other = BehaviorId(1);
///
/// wb.set(flipper, EntryKey::TargetObject, EntryValue::Object(ObjectId(4)), EntryScope::Activation)
///     .unwrap();
/// assert!(wb.clear(other, EntryKey::TargetObject).is_err());
///
/// assert_eq!(wb.clear_activation_entries(flipper), 1);
/// assert!(wb.get(EntryKey::TargetObject).is_none());
/// ```
#[derive(Debug, Default)]
pub struct Whiteboard {
    entries: BTreeMap<EntryKey, Entry>,
    failures: BTreeMap<ObjectUse, VecDeque<FailureRecord>>,
}

impl Whiteboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `value` under `key`.  Fails when another behavior owns the
    /// entry.
    pub fn set(
        &mut self,
        owner: BehaviorId,
        key: EntryKey,
        value: EntryValue,
        scope: EntryScope,
    ) -> Result<(), WhiteboardError> {
        self.check_owner(owner, key)?;
        debug!(%owner, ?key, ?value, ?scope, "whiteboard entry set");
        self.entries.insert(key, Entry { owner, scope, value });
        Ok(())
    }

    /// Remove `key`.  Returns `Ok(false)` when it was not set.
    pub fn clear(&mut self, owner: BehaviorId, key: EntryKey) -> Result<bool, WhiteboardError> {
        self.check_owner(owner, key)?;
        let removed = self.entries.remove(&key).is_some();
        if removed {
            debug!(%owner, ?key, "whiteboard entry cleared");
        }
        Ok(removed)
    }

    /// Take over a session-scoped entry so that `new_owner` becomes its only
    /// writer.
    pub fn adopt(&mut self, new_owner: BehaviorId, key: EntryKey) -> Result<Option<EntryValue>, WhiteboardError> {
        let Some(entry) = self.entries.get_mut(&key) else {
            return Ok(None);
        };
        if entry.scope != EntryScope::Session && entry.owner != new_owner {
            return Err(WhiteboardError::NotAdoptable(key));
        }
        debug!(from = %entry.owner, to = %new_owner, ?key, "whiteboard entry adopted");
        entry.owner = new_owner;
        Ok(Some(entry.value))
    }

    /// Drop every activation-scoped entry owned by `owner`.  Returns how many
    /// were removed.
    pub fn clear_activation_entries(&mut self, owner: BehaviorId) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, e| !(e.owner == owner && e.scope == EntryScope::Activation));
        before - self.entries.len()
    }

    /// Forget everything, entries and failures alike.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.failures.clear();
    }

    pub fn get(&self, key: EntryKey) -> Option<EntryValue> {
        self.entries.get(&key).map(|e| e.value)
    }

    pub fn owner_of(&self, key: EntryKey) -> Option<BehaviorId> {
        self.entries.get(&key).map(|e| e.owner)
    }

    pub fn stack_to_admire(&self) -> Option<StackToAdmire> {
        match self.get(EntryKey::StackToAdmire) {
            Some(EntryValue::Stack(stack)) => Some(stack),
            _ => None,
        }
    }

    pub fn target_object(&self) -> Option<ObjectId> {
        match self.get(EntryKey::TargetObject) {
            Some(EntryValue::Object(id)) => Some(id),
            _ => None,
        }
    }

    // -------------------------------------------------------------------------
    // Failures
    // -------------------------------------------------------------------------

    /// Remember that `use_` of `object` failed at `tick`.
    pub fn record_failure(&mut self, use_: ObjectUse, object: ObjectId, pose: Pose, tick: u64) {
        let list = self.failures.entry(use_).or_default();
        if list.len() == use_.capacity() {
            list.pop_front();
        }
        list.push_back(FailureRecord { object, pose, tick });
        debug!(?use_, %object, tick, "object-use failure recorded");
    }

    /// `true` when `use_` of `object` failed within the last `within_ticks`
    /// ticks before `now`.
    pub fn did_fail(&self, use_: ObjectUse, object: ObjectId, within_ticks: u64, now: u64) -> bool {
        self.failures.get(&use_).is_some_and(|list| {
            list.iter()
                .any(|r| r.object == object && now.saturating_sub(r.tick) <= within_ticks)
        })
    }

    /// Remembered failures for `use_`, oldest first.
    pub fn failures(&self, use_: ObjectUse) -> impl Iterator<Item = &FailureRecord> {
        self.failures.get(&use_).into_iter().flatten()
    }

    fn check_owner(&self, requester: BehaviorId, key: EntryKey) -> Result<(), WhiteboardError> {
        match self.entries.get(&key) {
            Some(entry) if entry.owner != requester => Err(WhiteboardError::NotOwner {
                key,
                owner: entry.owner,
                requester,
            }),
            _ => Ok(()),
        }
    }
}
