//! [`TrackLockTable`] – exclusive ownership of the robot's output tracks.
//!
//! An action acquires its [`TrackSet`] before it issues any command and
//! receives a [`TrackClaim`] token in return.  The token is the only way to
//! give the tracks back, so a claim cannot be released by anybody but its
//! holder.
//!
//! Composite actions that reserve tracks for all of their descendants hand
//! out an [`InheritedClaim`] instead of letting each child contend on its own.
//! A child covered by a live inherited claim never touches the table.
//!
//! # Example
//!
//! ```
//! use botcore_kernel::track_locks::TrackLockTable;
//! use botcore_types::{ActionTag, Track};
//!
//! let mut table = TrackLockTable::new();
//! let drive = ActionTag::from_raw(1);
//! let anim = ActionTag::from_raw(2);
//!
//! let claim = table.try_acquire(drive, Track::Body.into()).unwrap();
//! assert!(table.try_acquire(anim, Track::Body | Track::Sound).is_err());
//!
//! table.release(claim);
//! assert!(table.try_acquire(anim, Track::Body | Track::Sound).is_ok());
//! ```

use botcore_types::{ActionTag, Track, TrackSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Opaque identity of one acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClaimId(u64);

/// Proof of exclusive ownership of a set of tracks.
///
/// Not `Clone`: exactly one owner can hand it back to
/// [`TrackLockTable::release`].
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a TrackClaim without releasing it keeps the tracks locked"]
pub struct TrackClaim {
    id: ClaimId,
    owner: ActionTag,
    tracks: TrackSet,
}

impl TrackClaim {
    pub fn owner(&self) -> ActionTag {
        self.owner
    }

    pub fn tracks(&self) -> TrackSet {
        self.tracks
    }

    /// Derive a grant that descendants use in place of their own claims.
    pub fn inherit(&self) -> InheritedClaim {
        InheritedClaim {
            id: self.id,
            tracks: self.tracks,
        }
    }
}

/// A read-only grant derived from an ancestor's [`TrackClaim`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InheritedClaim {
    id: ClaimId,
    tracks: TrackSet,
}

impl InheritedClaim {
    pub fn tracks(&self) -> TrackSet {
        self.tracks
    }
}

/// A required track is already held by a different action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("track {track} requested by {requester} is held by {holder}")]
pub struct TrackConflict {
    pub track: Track,
    pub holder: ActionTag,
    pub requester: ActionTag,
}

#[derive(Debug, Clone, Copy)]
struct Holder {
    claim: ClaimId,
    owner: ActionTag,
}

/// Per-track ownership table.
#[derive(Debug, Default)]
pub struct TrackLockTable {
    holders: [Option<Holder>; Track::COUNT],
    next_claim: u64,
}

impl TrackLockTable {
    /// Create a table with every track free.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim every track in `tracks` for `owner`, all or nothing.
    ///
    /// Returns the first conflicting track when any of them is held.  An empty
    /// set always succeeds and locks nothing.
    pub fn try_acquire(
        &mut self,
        owner: ActionTag,
        tracks: TrackSet,
    ) -> Result<TrackClaim, TrackConflict> {
        if let Some((track, holder)) = tracks
            .iter()
            .find_map(|t| self.holders[t.index()].map(|h| (t, h.owner)))
        {
            warn!(requester = %owner, holder = %holder, %track, "track conflict");
            return Err(TrackConflict {
                track,
                holder,
                requester: owner,
            });
        }

        self.next_claim += 1;
        let id = ClaimId(self.next_claim);
        for track in tracks.iter() {
            self.holders[track.index()] = Some(Holder { claim: id, owner });
        }
        debug!(owner = %owner, %tracks, "tracks acquired");
        Ok(TrackClaim { id, owner, tracks })
    }

    /// Give back the tracks of `claim`.
    ///
    /// Only slots still held by this exact claim are freed, so releasing
    /// never disturbs a later holder.
    pub fn release(&mut self, claim: TrackClaim) {
        for track in claim.tracks.iter() {
            let slot = &mut self.holders[track.index()];
            if slot.is_some_and(|h| h.claim == claim.id) {
                *slot = None;
            }
        }
        debug!(owner = %claim.owner, tracks = %claim.tracks, "tracks released");
    }

    /// `true` while the ancestor claim behind `grant` still holds every one
    /// of its tracks.
    pub fn is_live(&self, grant: InheritedClaim) -> bool {
        grant
            .tracks
            .iter()
            .all(|t| self.holders[t.index()].is_some_and(|h| h.claim == grant.id))
    }

    /// `true` when `grant` is live and covers all of `tracks`.
    pub fn covers(&self, grant: InheritedClaim, tracks: TrackSet) -> bool {
        grant.tracks.contains_all(tracks) && self.is_live(grant)
    }

    /// The action holding `track`, if any.
    pub fn holder(&self, track: Track) -> Option<ActionTag> {
        self.holders[track.index()].map(|h| h.owner)
    }

    /// Every track currently held by someone.
    pub fn locked_tracks(&self) -> TrackSet {
        Track::ALL
            .into_iter()
            .filter(|t| self.holders[t.index()].is_some())
            .collect()
    }

    /// Tracks currently held by `owner`.
    pub fn held_by(&self, owner: ActionTag) -> TrackSet {
        Track::ALL
            .into_iter()
            .filter(|t| self.holders[t.index()].is_some_and(|h| h.owner == owner))
            .collect()
    }

    /// `true` when any track of `tracks` is held.
    pub fn any_locked(&self, tracks: TrackSet) -> bool {
        self.locked_tracks().intersects(tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(n: u32) -> ActionTag {
        ActionTag::from_raw(n)
    }

    #[test]
    fn acquire_marks_holder() {
        let mut table = TrackLockTable::new();
        let claim = table.try_acquire(tag(1), Track::Body | Track::Lift).unwrap();
        assert_eq!(table.holder(Track::Body), Some(tag(1)));
        assert_eq!(table.holder(Track::Lift), Some(tag(1)));
        assert_eq!(table.holder(Track::Head), None);
        assert_eq!(table.held_by(tag(1)), claim.tracks());
        table.release(claim);
        assert!(table.locked_tracks().is_empty());
    }

    #[test]
    fn conflict_is_all_or_nothing() {
        let mut table = TrackLockTable::new();
        let _lift = table.try_acquire(tag(1), Track::Lift.into()).unwrap();
        let err = table
            .try_acquire(tag(2), Track::Head | Track::Lift)
            .unwrap_err();
        assert_eq!(err.track, Track::Lift);
        assert_eq!(err.holder, tag(1));
        // Head must not have been taken by the failed request.
        assert_eq!(table.holder(Track::Head), None);
    }

    #[test]
    fn empty_set_always_succeeds() {
        let mut table = TrackLockTable::new();
        let _all = table.try_acquire(tag(1), TrackSet::ALL).unwrap();
        let empty = table.try_acquire(tag(2), TrackSet::EMPTY).unwrap();
        assert!(empty.tracks().is_empty());
    }

    #[test]
    fn inherited_claim_dies_with_parent() {
        let mut table = TrackLockTable::new();
        let parent = table.try_acquire(tag(1), Track::Body | Track::Lift).unwrap();
        let grant = parent.inherit();
        assert!(table.covers(grant, Track::Lift.into()));
        assert!(!table.covers(grant, Track::Head.into()));

        table.release(parent);
        assert!(!table.is_live(grant));
        assert!(!table.covers(grant, Track::Lift.into()));
    }

    #[test]
    fn release_does_not_touch_later_holder() {
        let mut table = TrackLockTable::new();
        let first = table.try_acquire(tag(1), Track::Body.into()).unwrap();
        let stale = TrackClaim {
            id: first.id,
            owner: first.owner,
            tracks: first.tracks,
        };
        table.release(first);
        let second = table.try_acquire(tag(2), Track::Body.into()).unwrap();
        // Releasing the first claim again must leave the second holder alone.
        table.release(stale);
        assert_eq!(table.holder(Track::Body), Some(tag(2)));
        table.release(second);
    }
}
