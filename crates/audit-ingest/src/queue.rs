use std::collections::VecDeque;

use rand::Rng;
use tokio::sync::{Mutex, Notify};

use audit_types::event::UnsealedEvent;
use audit_types::DropPolicy;

/// Result of attempting to admit one event to the bounded queue.
pub enum AdmitOutcome {
    /// The event was admitted without evicting anything.
    Admitted,
    /// The event was admitted, but `dropped` had to be evicted to make
    /// room for it (or, under the `Newest` policy, `dropped` is the
    /// incoming event itself and the queue was left unchanged).
    AdmittedWithDrop(UnsealedEvent),
    /// The queue was full and graceful degradation is disabled.
    Rejected,
}

/// The ingestor's bounded, non-blocking in-memory queue, grounded on
/// `toka-bus-core::InMemoryBus`'s broadcast-channel idiom but generalized
/// to support the drop policies spec §4.1 requires (`tokio::sync::mpsc`
/// has no way to evict an already-queued item, so a guarded `VecDeque`
/// takes its place). `push` and `drain` only ever hold the mutex for a
/// handful of `VecDeque` operations, so in practice this never blocks a
/// caller behind slow I/O the way a store write would.
pub struct IngestQueue {
    inner: Mutex<VecDeque<UnsealedEvent>>,
    capacity: usize,
    notify: Notify,
}

impl IngestQueue {
    /// Construct an empty queue with the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Attempt to admit `event`. When the queue is full, `degrade`
    /// selects between applying `policy` (graceful degradation) and
    /// rejecting the event outright.
    pub async fn push(
        &self,
        event: UnsealedEvent,
        policy: DropPolicy,
        degrade: bool,
    ) -> AdmitOutcome {
        let mut queue = self.inner.lock().await;

        if queue.len() < self.capacity {
            queue.push_back(event);
            drop(queue);
            self.notify.notify_one();
            return AdmitOutcome::Admitted;
        }

        if !degrade {
            return AdmitOutcome::Rejected;
        }

        match policy {
            DropPolicy::Oldest => {
                let dropped = queue
                    .pop_front()
                    .expect("queue at capacity must be non-empty");
                queue.push_back(event);
                drop(queue);
                self.notify.notify_one();
                AdmitOutcome::AdmittedWithDrop(dropped)
            }
            DropPolicy::Newest => AdmitOutcome::AdmittedWithDrop(event),
            DropPolicy::Random => {
                let index = rand::thread_rng().gen_range(0..queue.len());
                let dropped = queue
                    .remove(index)
                    .expect("index is in bounds by construction");
                queue.push_back(event);
                drop(queue);
                self.notify.notify_one();
                AdmitOutcome::AdmittedWithDrop(dropped)
            }
        }
    }

    /// Drain up to `max` events in FIFO order, for the batch coordinator.
    pub async fn drain(&self, max: usize) -> Vec<UnsealedEvent> {
        let mut queue = self.inner.lock().await;
        let take = max.min(queue.len());
        queue.drain(..take).collect()
    }

    /// Wait until at least one event is queued or `deadline` elapses,
    /// whichever comes first. Used by the batch coordinator's timeout-based
    /// flush instead of a busy poll.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    /// Current queue depth.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    /// Whether the queue currently holds no events.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_types::event::{Actor, EventTimestamp, TargetRef};
    use audit_types::Severity;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn event(tag: &str) -> UnsealedEvent {
        UnsealedEvent {
            id: Uuid::new_v4(),
            event_type: "auth.login".into(),
            severity: Severity::Low,
            actor: Actor::new(tag),
            target: TargetRef::new("t"),
            action: "login".into(),
            result: "success".into(),
            timestamp: EventTimestamp { wall: chrono::Utc::now(), monotonic_nanos: 0 },
            data_classes: Default::default(),
            legal_basis: None,
            compliance_attributes: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn admits_until_capacity() {
        let queue = IngestQueue::new(2);
        assert!(matches!(
            queue.push(event("a"), DropPolicy::Oldest, true).await,
            AdmitOutcome::Admitted
        ));
        assert!(matches!(
            queue.push(event("b"), DropPolicy::Oldest, true).await,
            AdmitOutcome::Admitted
        ));
        assert_eq!(queue.len().await, 2);
    }

    #[tokio::test]
    async fn rejects_when_full_and_degradation_disabled() {
        let queue = IngestQueue::new(1);
        queue.push(event("a"), DropPolicy::Oldest, true).await;
        assert!(matches!(
            queue.push(event("b"), DropPolicy::Oldest, false).await,
            AdmitOutcome::Rejected
        ));
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn oldest_policy_evicts_front() {
        let queue = IngestQueue::new(1);
        queue.push(event("a"), DropPolicy::Oldest, true).await;
        let outcome = queue.push(event("b"), DropPolicy::Oldest, true).await;
        match outcome {
            AdmitOutcome::AdmittedWithDrop(dropped) => assert_eq!(dropped.actor.id, "a"),
            _ => panic!("expected a drop"),
        }
        let drained = queue.drain(10).await;
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].actor.id, "b");
    }

    #[tokio::test]
    async fn newest_policy_drops_incoming() {
        let queue = IngestQueue::new(1);
        queue.push(event("a"), DropPolicy::Oldest, true).await;
        let outcome = queue.push(event("b"), DropPolicy::Newest, true).await;
        match outcome {
            AdmitOutcome::AdmittedWithDrop(dropped) => assert_eq!(dropped.actor.id, "b"),
            _ => panic!("expected a drop"),
        }
        let drained = queue.drain(10).await;
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].actor.id, "a");
    }

    #[tokio::test]
    async fn drain_respects_fifo_order() {
        let queue = IngestQueue::new(5);
        for tag in ["a", "b", "c"] {
            queue.push(event(tag), DropPolicy::Oldest, true).await;
        }
        let drained = queue.drain(10).await;
        let tags: Vec<_> = drained.iter().map(|e| e.actor.id.clone()).collect();
        assert_eq!(tags, vec!["a", "b", "c"]);
    }
}
