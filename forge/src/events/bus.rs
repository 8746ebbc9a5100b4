use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::types::{Event, EventPayload};

pub const DEFAULT_CHANNEL_CAPACITY: usize = 10_000;

/// Fans events out over a broadcast channel. Publishing never blocks the
/// caller: `broadcast::Sender::send` only fails when there are no
/// subscribers, which is not an error from the publisher's point of view.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Non-blocking publish. A subscriber that falls behind starts missing
    /// the oldest messages (broadcast lag) rather than stalling the Runner.
    pub fn publish(&self, payload: EventPayload, now: i64) -> Event {
        let event = Event::new(Uuid::now_v7().to_string(), now, payload);
        if self.tx.send(event.clone()).is_err() {
            debug!(event_type = event.event_type(), "published with no subscribers");
        }
        event
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn emitter(&self) -> EventEmitter {
        EventEmitter { tx: self.tx.clone() }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// A cheap-to-clone handle for emitting events without holding a reference
/// to the bus itself; every Runner task gets one.
#[derive(Clone)]
pub struct EventEmitter {
    tx: broadcast::Sender<Event>,
}

impl EventEmitter {
    pub fn emit(&self, payload: EventPayload, now: i64) -> Event {
        let event = Event::new(Uuid::now_v7().to_string(), now, payload);
        let _ = self.tx.send(event.clone());
        event
    }
}
