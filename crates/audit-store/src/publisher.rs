use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use audit_types::SealedEvent;

/// Fire-and-forget publish contract, per spec §6: the publisher owns its
/// own buffering and never blocks the batch worker beyond a short timeout.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish one sealed event to all subscribers. Never fails: a full
    /// downstream buffer simply drops the event for slow subscribers.
    async fn publish(&self, event: SealedEvent);
}

/// A `tokio::sync::broadcast`-backed publisher, grounded on
/// `toka-ledger-core::VaultBus`/`toka-bus-core::InMemoryBus`'s
/// broadcast-channel pattern.
#[derive(Debug, Clone)]
pub struct BroadcastPublisher {
    tx: Arc<broadcast::Sender<SealedEvent>>,
}

impl BroadcastPublisher {
    /// Construct a publisher with the given channel capacity. Capacity
    /// determines how many events slow subscribers can lag behind before
    /// they start missing events.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx: Arc::new(tx) }
    }

    /// Subscribe to the live event stream (used by the streamer's
    /// dispatcher loop).
    pub fn subscribe(&self) -> broadcast::Receiver<SealedEvent> {
        self.tx.subscribe()
    }

    /// Current number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl Publisher for BroadcastPublisher {
    async fn publish(&self, event: SealedEvent) {
        // Ignore send errors: no subscribers is a normal, not exceptional,
        // state for the publisher.
        if self.tx.send(event).is_err() {
            debug!("published event had no subscribers");
        }
    }
}
