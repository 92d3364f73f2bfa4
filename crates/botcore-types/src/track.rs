//! Physical output channels and sets of them.
//!
//! Every action declares the [`TrackSet`] it needs exclusive use of.  The
//! kernel's track lock table guarantees that at most one action holds any
//! given [`Track`] at a time.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Sub};

use serde::{Deserialize, Serialize};

/// A single physical output channel of the robot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Track {
    /// Drive base (treads / wheels).
    Body,
    /// Head tilt motor.
    Head,
    /// Lift / fork motor.
    Lift,
    /// Sound channel.
    Sound,
    /// Procedural animation layer (face, lights).
    Animation,
}

impl Track {
    /// Every track, in bit order.
    pub const ALL: [Track; 5] = [
        Track::Body,
        Track::Head,
        Track::Lift,
        Track::Sound,
        Track::Animation,
    ];

    /// Number of distinct tracks.
    pub const COUNT: usize = Self::ALL.len();

    /// Index of this track into per-track arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Track::Body => "body",
            Track::Head => "head",
            Track::Lift => "lift",
            Track::Sound => "sound",
            Track::Animation => "animation",
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A bitset over [`Track`].
///
/// ```
/// use botcore_types::{Track, TrackSet};
///
/// let drive = TrackSet::from(Track::Body);
/// let motion = drive | Track::Lift;
///
/// assert!(motion.contains(Track::Lift));
/// assert!(motion.intersects(drive));
/// assert_eq!((motion - drive), TrackSet::from(Track::Lift));
/// assert_eq!(motion.to_string(), "body|lift");
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackSet(u8);

impl TrackSet {
    /// The empty set.
    pub const EMPTY: TrackSet = TrackSet(0);
    /// Every track.
    pub const ALL: TrackSet = TrackSet(0b1_1111);

    pub const fn single(track: Track) -> Self {
        TrackSet(track.bit())
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub const fn contains(self, track: Track) -> bool {
        self.0 & track.bit() != 0
    }

    /// `true` when every track of `other` is also in `self`.
    pub const fn contains_all(self, other: TrackSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: TrackSet) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: TrackSet) -> Self {
        TrackSet(self.0 | other.0)
    }

    pub const fn intersection(self, other: TrackSet) -> Self {
        TrackSet(self.0 & other.0)
    }

    pub const fn difference(self, other: TrackSet) -> Self {
        TrackSet(self.0 & !other.0)
    }

    /// Iterate the tracks in this set in bit order.
    pub fn iter(self) -> impl Iterator<Item = Track> {
        Track::ALL.into_iter().filter(move |t| self.contains(*t))
    }
}

impl From<Track> for TrackSet {
    fn from(track: Track) -> Self {
        TrackSet::single(track)
    }
}

impl FromIterator<Track> for TrackSet {
    fn from_iter<I: IntoIterator<Item = Track>>(iter: I) -> Self {
        iter.into_iter()
            .fold(TrackSet::EMPTY, |acc, t| acc.union(t.into()))
    }
}

impl<T: Into<TrackSet>> BitOr<T> for TrackSet {
    type Output = TrackSet;
    fn bitor(self, rhs: T) -> TrackSet {
        self.union(rhs.into())
    }
}

impl BitOr<Track> for Track {
    type Output = TrackSet;
    fn bitor(self, rhs: Track) -> TrackSet {
        TrackSet::from(self) | rhs
    }
}

impl<T: Into<TrackSet>> BitOrAssign<T> for TrackSet {
    fn bitor_assign(&mut self, rhs: T) {
        *self = self.union(rhs.into());
    }
}

impl<T: Into<TrackSet>> BitAnd<T> for TrackSet {
    type Output = TrackSet;
    fn bitand(self, rhs: T) -> TrackSet {
        self.intersection(rhs.into())
    }
}

impl<T: Into<TrackSet>> Sub<T> for TrackSet {
    type Output = TrackSet;
    fn sub(self, rhs: T) -> TrackSet {
        self.difference(rhs.into())
    }
}

impl fmt::Display for TrackSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        for track in self.iter() {
            if !first {
                f.write_str("|")?;
            }
            f.write_str(track.as_str())?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for TrackSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TrackSet({self})")
    }
}
