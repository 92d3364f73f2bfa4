//! Geometry and world-object vocabulary used by the world snapshot boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a pose origin.  Poses are only comparable within a frame;
/// the robot gets a new origin every time it is delocalized (e.g. picked up).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrameId(pub u32);

/// A planar pose with height, in millimetres and radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub frame: FrameId,
    pub x_mm: f32,
    pub y_mm: f32,
    pub z_mm: f32,
    pub angle_rad: f32,
}

impl Pose {
    /// A pose in the default frame at height zero.
    pub const fn new(x_mm: f32, y_mm: f32, angle_rad: f32) -> Self {
        Self {
            frame: FrameId(0),
            x_mm,
            y_mm,
            z_mm: 0.0,
            angle_rad,
        }
    }

    pub const fn in_frame(mut self, frame: FrameId) -> Self {
        self.frame = frame;
        self
    }

    pub const fn at_height(mut self, z_mm: f32) -> Self {
        self.z_mm = z_mm;
        self
    }

    /// Planar distance to `other`, or `None` when the two poses live in
    /// different frames and cannot be compared.
    pub fn distance_to(&self, other: &Pose) -> Option<f32> {
        if self.frame != other.frame {
            return None;
        }
        Some((self.x_mm - other.x_mm).hypot(self.y_mm - other.y_mm))
    }

    /// Absolute heading difference in `[0, π]`, or `None` across frames.
    pub fn angle_to(&self, other: &Pose) -> Option<f32> {
        if self.frame != other.frame {
            return None;
        }
        let mut diff = (self.angle_rad - other.angle_rad) % std::f32::consts::TAU;
        if diff < 0.0 {
            diff += std::f32::consts::TAU;
        }
        Some(diff.min(std::f32::consts::TAU - diff))
    }

    /// Move `distance_mm` along the current heading.
    pub fn advanced(&self, distance_mm: f32) -> Pose {
        Pose {
            x_mm: self.x_mm + distance_mm * self.angle_rad.cos(),
            y_mm: self.y_mm + distance_mm * self.angle_rad.sin(),
            ..*self
        }
    }
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({:.1}, {:.1}, {:.1}) @ {:.2}rad [frame {}]",
            self.x_mm, self.y_mm, self.z_mm, self.angle_rad, self.frame.0
        )
    }
}

/// Identifier of a located world object (block, charger, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "object_{}", self.0)
    }
}

/// How a block is resting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectOrientation {
    Upright,
    OnSide,
    UpsideDown,
}

/// Snapshot of a located object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObjectHandle {
    pub id: ObjectId,
    pub pose: Pose,
    pub orientation: ObjectOrientation,
}

/// The most recent face sighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    /// Control-loop tick at which the face was last seen.
    pub observed_tick: u64,
    pub pose: Pose,
}
