//! `botcore-types` – shared vocabulary of the botcore scheduler.
//!
//! Every other crate in the workspace speaks in these types: the physical
//! output [`Track`]s an action claims, the [`ActionTag`] identity and
//! [`ActionResult`] outcome of an action, world geometry handed across the
//! world-snapshot boundary, the [`MotorCommand`]s primitives issue, the
//! [`Event`]s delivered to behaviors and the [`ReactionTrigger`]s they can
//! suppress.

pub mod action;
pub mod behavior;
pub mod command;
pub mod config;
pub mod event;
pub mod track;
pub mod world;

use thiserror::Error;

pub use action::{ActionResult, ActionState, ActionTag, FailureKind};
pub use behavior::{BehaviorId, ReactionTrigger};
pub use command::{CommandId, LiftTarget, MotorCommand};
pub use config::{BehaviorConfig, ConfigValue};
pub use event::{Event, EventPayload, EventTag};
pub use track::{Track, TrackSet};
pub use world::{FaceObservation, FrameId, ObjectHandle, ObjectId, ObjectOrientation, Pose};

/// Error type shared by the vocabulary crates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("missing configuration key: {0}")]
    MissingConfigKey(String),

    #[error("configuration key {key} is not a {expected} value")]
    ConfigType { key: String, expected: &'static str },

    #[error("unknown reaction trigger: {0}")]
    UnknownReactionTrigger(String),

    #[error("unknown behavior: {0}")]
    UnknownBehavior(String),

    #[error("cannot register more than {max} behaviors")]
    TooManyBehaviors { max: usize },
}
