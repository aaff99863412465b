//! Broadcast boundary
//!
//! Fans relay events out to every connected viewer. Delivery is best-effort:
//! a viewer that falls more than the channel capacity behind loses the
//! oldest events rather than stalling the producer.

use tokio::sync::broadcast;

use crate::event::RelayEvent;

/// Default number of events buffered per subscriber
pub const DEFAULT_CAPACITY: usize = 256;

/// Publish side of the viewer broadcast channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RelayEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe a new viewer
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    /// Publish to all current subscribers.
    ///
    /// With no viewers connected the event is dropped; publishing never
    /// fails from the producer's point of view.
    pub fn publish(&self, event: RelayEvent) {
        let _ = self.tx.send(event);
    }

    /// Number of currently subscribed viewers
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
