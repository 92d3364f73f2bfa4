//! In-process world-event bus.
//!
//! Uses [`tokio::sync::broadcast`] so every receiver sees every event and a
//! slow receiver never blocks the publisher.  The control loop is
//! synchronous, so it drains its receiver with [`EventReceiver::drain`] once
//! per tick; async consumers can await [`EventReceiver::recv`].
//!
//! ```
//! use botcore_runtime::event_bus::EventBus;
//! use botcore_types::{Event, EventPayload, EventTag};
//!
//! let bus = EventBus::default();
//! let mut cliffs = bus.subscribe_tags([EventTag::CliffDetected]);
//!
//! bus.publish(Event::new("sim", EventPayload::RobotPickedUp)).unwrap();
//! bus.publish(Event::new("sim", EventPayload::CliffDetected)).unwrap();
//!
//! let events = cliffs.drain();
//! assert_eq!(events.len(), 1);
//! assert_eq!(events[0].tag(), EventTag::CliffDetected);
//! ```

use std::collections::BTreeSet;

use botcore_types::{Event, EventTag};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

/// Events buffered per receiver before the oldest are dropped.
const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no receivers for {0:?}")]
    NoReceivers(EventTag),
}

/// Shared bus handle.  Clones publish into the same channel.
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish `event`, returning how many receivers were handed it.
    pub fn publish(&self, event: Event) -> Result<usize, BusError> {
        let tag = event.tag();
        self.sender
            .send(event)
            .map_err(|_| BusError::NoReceivers(tag))
    }

    /// Receive every event.
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            filter: None,
            receiver: self.sender.subscribe(),
            lagged: 0,
        }
    }

    /// Receive only events whose tag is in `tags`.
    pub fn subscribe_tags(&self, tags: impl IntoIterator<Item = EventTag>) -> EventReceiver {
        EventReceiver {
            filter: Some(tags.into_iter().collect()),
            receiver: self.sender.subscribe(),
            lagged: 0,
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Receiver
// ---------------------------------------------------------------------------

pub struct EventReceiver {
    filter: Option<BTreeSet<EventTag>>,
    receiver: broadcast::Receiver<Event>,
    lagged: u64,
}

impl EventReceiver {
    fn wants(&self, event: &Event) -> bool {
        self.filter
            .as_ref()
            .is_none_or(|tags| tags.contains(&event.tag()))
    }

    /// Everything published since the last call, without waiting.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(event) if self.wants(&event) => events.push(event),
                Ok(_) => {}
                Err(TryRecvError::Lagged(n)) => {
                    warn!(dropped = n, "event receiver lagged");
                    self.lagged += n;
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => return events,
            }
        }
    }

    /// Wait for the next matching event.  `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.wants(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    warn!(dropped = n, "event receiver lagged");
                    self.lagged += n;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Total events dropped because this receiver fell behind.
    pub fn lagged(&self) -> u64 {
        self.lagged
    }
}
