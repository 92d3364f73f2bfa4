//! Behavior identity and the closed set of reflexes a behavior can suppress.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Identity of a registered behavior, assigned by the arbiter in
/// registration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BehaviorId(pub u16);

impl fmt::Display for BehaviorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "behavior#{}", self.0)
    }
}

/// A low-priority reflex that an active behavior may suppress through a
/// reaction lock.
///
/// ```
/// use botcore_types::ReactionTrigger;
///
/// let t: ReactionTrigger = "cube_moved".parse().unwrap();
/// assert_eq!(t, ReactionTrigger::CubeMoved);
/// assert_eq!(t.as_str(), "cube_moved");
/// assert!("no_such_reflex".parse::<ReactionTrigger>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionTrigger {
    CliffDetected,
    RobotPickedUp,
    ObjectPositionUpdated,
    CubeMoved,
    FacePositionUpdated,
    UnexpectedMovement,
    StackOfCubesInitialDetection,
    Sparked,
}

impl ReactionTrigger {
    pub const ALL: [ReactionTrigger; 8] = [
        ReactionTrigger::CliffDetected,
        ReactionTrigger::RobotPickedUp,
        ReactionTrigger::ObjectPositionUpdated,
        ReactionTrigger::CubeMoved,
        ReactionTrigger::FacePositionUpdated,
        ReactionTrigger::UnexpectedMovement,
        ReactionTrigger::StackOfCubesInitialDetection,
        ReactionTrigger::Sparked,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReactionTrigger::CliffDetected => "cliff_detected",
            ReactionTrigger::RobotPickedUp => "robot_picked_up",
            ReactionTrigger::ObjectPositionUpdated => "object_position_updated",
            ReactionTrigger::CubeMoved => "cube_moved",
            ReactionTrigger::FacePositionUpdated => "face_position_updated",
            ReactionTrigger::UnexpectedMovement => "unexpected_movement",
            ReactionTrigger::StackOfCubesInitialDetection => "stack_of_cubes_initial_detection",
            ReactionTrigger::Sparked => "sparked",
        }
    }
}

impl fmt::Display for ReactionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionTrigger {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ReactionTrigger::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoreError::UnknownReactionTrigger(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_trigger_parses_back_from_its_name() {
        for t in ReactionTrigger::ALL {
            assert_eq!(t.as_str().parse::<ReactionTrigger>().unwrap(), t);
        }
    }

    #[test]
    fn unknown_trigger_is_an_error() {
        let err = "wiggle".parse::<ReactionTrigger>().unwrap_err();
        assert!(err.to_string().contains("wiggle"));
    }

    #[test]
    fn behavior_id_display() {
        assert_eq!(BehaviorId(3).to_string(), "behavior#3");
    }
}
