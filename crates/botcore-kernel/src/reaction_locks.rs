//! [`ReactionLockManager`] – suppression of low-priority reflexes.
//!
//! A behavior that must not be interrupted by a reflex (for example "a cube
//! moved") acquires a reaction lock on that [`ReactionTrigger`].  The trigger
//! stays suppressed while at least one behavior holds it.
//!
//! | Operation | Duplicate / missing lock |
//! |-----------|--------------------------|
//! | [`acquire`][ReactionLockManager::acquire] | rejected with [`ReactionLockError::AlreadyHeld`] |
//! | [`release`][ReactionLockManager::release] | no-op |
//!
//! # Example
//!
//! ```
//! use botcore_kernel::reaction_locks::ReactionLockManager;
//! use botcore_types::{BehaviorId, ReactionTrigger};
//!
//! let mut locks = ReactionLockManager::new();
//! let admire = BehaviorId(1);
//!
//! locks.acquire(admire, &[ReactionTrigger::CubeMoved]).unwrap();
//! assert!(locks.is_suppressed(ReactionTrigger::CubeMoved));
//!
//! // A second acquisition by the same behavior is a logic error.
//! assert!(locks.acquire(admire, &[ReactionTrigger::CubeMoved]).is_err());
//!
//! locks.release(admire, &[ReactionTrigger::CubeMoved]);
//! locks.release(admire, &[ReactionTrigger::CubeMoved]); // no-op
//! assert!(!locks.is_suppressed(ReactionTrigger::CubeMoved));
//! ```

use std::collections::{BTreeMap, BTreeSet};

use botcore_types::{BehaviorId, ReactionTrigger};
use thiserror::Error;
use tracing::{debug, error};

/// Errors returned by [`ReactionLockManager::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReactionLockError {
    #[error("{behavior} already holds the reaction lock on {trigger}")]
    AlreadyHeld {
        behavior: BehaviorId,
        trigger: ReactionTrigger,
    },
}

/// Reference-counted suppression table keyed by trigger.
///
/// The count of a trigger is the number of distinct behaviors holding it.
#[derive(Debug, Default)]
pub struct ReactionLockManager {
    locks: BTreeMap<ReactionTrigger, BTreeSet<BehaviorId>>,
}

impl ReactionLockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppress every trigger in `triggers` on behalf of `behavior`.
    ///
    /// Atomic: if `behavior` already holds any of them (or a trigger repeats
    /// inside `triggers`), nothing is acquired and the first offending
    /// trigger is reported.
    pub fn acquire(
        &mut self,
        behavior: BehaviorId,
        triggers: &[ReactionTrigger],
    ) -> Result<(), ReactionLockError> {
        let mut seen = BTreeSet::new();
        for &trigger in triggers {
            let held = self
                .locks
                .get(&trigger)
                .is_some_and(|holders| holders.contains(&behavior));
            if held || !seen.insert(trigger) {
                error!(%behavior, %trigger, "reaction lock acquired twice");
                return Err(ReactionLockError::AlreadyHeld { behavior, trigger });
            }
        }

        for &trigger in triggers {
            self.locks.entry(trigger).or_default().insert(behavior);
            debug!(%behavior, %trigger, count = self.count(trigger), "reaction lock acquired");
        }
        Ok(())
    }

    /// Drop `behavior`'s locks on `triggers`.  Locks that are not held are
    /// ignored.
    pub fn release(&mut self, behavior: BehaviorId, triggers: &[ReactionTrigger]) {
        for trigger in triggers {
            if let Some(holders) = self.locks.get_mut(trigger) {
                if holders.remove(&behavior) {
                    debug!(%behavior, %trigger, "reaction lock released");
                }
                if holders.is_empty() {
                    self.locks.remove(trigger);
                }
            }
        }
    }

    /// Drop every lock held by `behavior` and return the triggers released.
    pub fn release_all(&mut self, behavior: BehaviorId) -> Vec<ReactionTrigger> {
        let held = self.held_by(behavior);
        self.release(behavior, &held);
        held
    }

    /// `true` while at least one behavior holds a lock on `trigger`.
    pub fn is_suppressed(&self, trigger: ReactionTrigger) -> bool {
        self.count(trigger) > 0
    }

    /// Number of behaviors suppressing `trigger`.
    pub fn count(&self, trigger: ReactionTrigger) -> usize {
        self.locks.get(&trigger).map_or(0, BTreeSet::len)
    }

    /// Triggers held by `behavior`, in trigger order.
    pub fn held_by(&self, behavior: BehaviorId) -> Vec<ReactionTrigger> {
        self.locks
            .iter()
            .filter(|(_, holders)| holders.contains(&behavior))
            .map(|(trigger, _)| *trigger)
            .collect()
    }

    /// Every `(behavior, trigger)` pair currently held.
    pub fn snapshot(&self) -> BTreeSet<(BehaviorId, ReactionTrigger)> {
        self.locks
            .iter()
            .flat_map(|(trigger, holders)| holders.iter().map(move |b| (*b, *trigger)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: BehaviorId = BehaviorId(1);
    const B: BehaviorId = BehaviorId(2);

    #[test]
    fn count_tracks_distinct_holders() {
        let mut mgr = ReactionLockManager::new();
        mgr.acquire(A, &[ReactionTrigger::CubeMoved]).unwrap();
        mgr.acquire(B, &[ReactionTrigger::CubeMoved]).unwrap();
        assert_eq!(mgr.count(ReactionTrigger::CubeMoved), 2);

        mgr.release(A, &[ReactionTrigger::CubeMoved]);
        assert!(mgr.is_suppressed(ReactionTrigger::CubeMoved));
        mgr.release(B, &[ReactionTrigger::CubeMoved]);
        assert!(!mgr.is_suppressed(ReactionTrigger::CubeMoved));
    }

    #[test]
    fn duplicate_acquire_is_rejected_atomically() {
        let mut mgr = ReactionLockManager::new();
        mgr.acquire(A, &[ReactionTrigger::CubeMoved]).unwrap();

        let err = mgr
            .acquire(
                A,
                &[ReactionTrigger::ObjectPositionUpdated, ReactionTrigger::CubeMoved],
            )
            .unwrap_err();
        assert_eq!(
            err,
            ReactionLockError::AlreadyHeld {
                behavior: A,
                trigger: ReactionTrigger::CubeMoved
            }
        );
        // Nothing from the rejected request was taken.
        assert!(!mgr.is_suppressed(ReactionTrigger::ObjectPositionUpdated));
        assert_eq!(mgr.count(ReactionTrigger::CubeMoved), 1);
    }

    #[test]
    fn repeated_trigger_in_one_request_is_rejected() {
        let mut mgr = ReactionLockManager::new();
        let result = mgr.acquire(A, &[ReactionTrigger::Sparked, ReactionTrigger::Sparked]);
        assert!(result.is_err());
        assert!(!mgr.is_suppressed(ReactionTrigger::Sparked));
    }

    #[test]
    fn release_of_unheld_lock_is_noop() {
        let mut mgr = ReactionLockManager::new();
        mgr.acquire(B, &[ReactionTrigger::CliffDetected]).unwrap();
        mgr.release(A, &[ReactionTrigger::CliffDetected, ReactionTrigger::Sparked]);
        assert_eq!(mgr.count(ReactionTrigger::CliffDetected), 1);
    }

    #[test]
    fn release_all_returns_to_prior_snapshot() {
        let mut mgr = ReactionLockManager::new();
        mgr.acquire(B, &[ReactionTrigger::RobotPickedUp]).unwrap();
        let before = mgr.snapshot();

        mgr.acquire(
            A,
            &[ReactionTrigger::CubeMoved, ReactionTrigger::RobotPickedUp],
        )
        .unwrap();
        let released = mgr.release_all(A);
        assert_eq!(
            released,
            vec![ReactionTrigger::RobotPickedUp, ReactionTrigger::CubeMoved]
        );
        assert_eq!(mgr.snapshot(), before);
    }
}
