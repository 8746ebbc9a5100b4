//! Fan-out of structured events to subscribers, each owning its own
//! buffered channel so a slow subscriber never blocks the publisher.

mod bus;
mod types;

pub use bus::{EventBus, EventEmitter};
pub use types::{Event, EventPayload};
