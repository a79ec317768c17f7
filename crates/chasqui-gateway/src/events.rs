use chasqui_common::{Event, EventBus};
use tokio::sync::broadcast;
use tracing::debug;

/// Event capacity before slow subscribers start missing events. Delivery is
/// at-most-once with no replay; the REST API is the catch-up path.
const CHANNEL_CAPACITY: usize = 256;

/// [`EventBus`] implementation that fans events out to every connected
/// WebSocket subscriber via a tokio broadcast channel.
pub struct BroadcastBus {
    tx: broadcast::Sender<Event>,
}

impl BroadcastBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus for BroadcastBus {
    fn emit(&self, event: Event) {
        // Send only fails when nobody is subscribed, which is fine.
        if self.tx.send(event).is_err() {
            debug!("event dropped, no subscribers connected");
        }
    }
}
