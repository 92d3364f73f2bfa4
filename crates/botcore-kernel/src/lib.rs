//! `botcore-kernel` – Rule-enforcing tables
//!
//! The bookkeeping that keeps behaviors and actions from stepping on each
//! other.  Nothing here schedules anything; the tables only grant, refuse and
//! record.
//!
//! # Modules
//!
//! - [`track_locks`] – [`TrackLockTable`][track_locks::TrackLockTable]:
//!   at most one action holds each physical output track.  Acquisition
//!   returns a [`TrackClaim`][track_locks::TrackClaim] token that composite
//!   actions can hand down to their children as an
//!   [`InheritedClaim`][track_locks::InheritedClaim].
//! - [`reaction_locks`] – [`ReactionLockManager`][reaction_locks::ReactionLockManager]:
//!   reference-counted suppression of low-priority reflexes while a behavior
//!   runs.  Double acquisition by the same behavior is rejected.
//! - [`whiteboard`] – [`Whiteboard`][whiteboard::Whiteboard]:
//!   owner-checked shared entries and bounded object-use failure memory.

pub mod reaction_locks;
pub mod track_locks;
pub mod whiteboard;

pub use reaction_locks::{ReactionLockError, ReactionLockManager};
pub use track_locks::{InheritedClaim, TrackClaim, TrackConflict, TrackLockTable};
pub use whiteboard::{
    EntryKey, EntryScope, EntryValue, FailureRecord, ObjectUse, StackToAdmire, Whiteboard,
    WhiteboardError,
};
