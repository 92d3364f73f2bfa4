//! World-observation events delivered to behaviors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::world::{ObjectId, Pose};

/// Unified event wrapper routed from the host to subscribed behaviors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "botcore-hal::sim"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp a new event with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }

    pub fn tag(&self) -> EventTag {
        self.payload.tag()
    }
}

/// Variants of observation a host can report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    ObjectObserved { object: ObjectId, pose: Pose },
    ObjectMoved { object: ObjectId },
    /// `top` was seen resting on `bottom`.
    ObjectStacked { top: ObjectId, bottom: ObjectId },
    FaceObserved { pose: Pose },
    RobotPickedUp,
    CliffDetected,
}

impl EventPayload {
    pub fn tag(&self) -> EventTag {
        match self {
            EventPayload::ObjectObserved { .. } => EventTag::ObjectObserved,
            EventPayload::ObjectMoved { .. } => EventTag::ObjectMoved,
            EventPayload::ObjectStacked { .. } => EventTag::ObjectStacked,
            EventPayload::FaceObserved { .. } => EventTag::FaceObserved,
            EventPayload::RobotPickedUp => EventTag::RobotPickedUp,
            EventPayload::CliffDetected => EventTag::CliffDetected,
        }
    }
}

/// Discriminant of [`EventPayload`], used for subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventTag {
    ObjectObserved,
    ObjectMoved,
    ObjectStacked,
    FaceObserved,
    RobotPickedUp,
    CliffDetected,
}
