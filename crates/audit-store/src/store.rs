use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use audit_types::event::EventId;
use audit_types::SealedEvent;

use crate::query::{QueryCriteria, SortOrder};

/// Durable, indexed event storage, per spec §6's store contract.
///
/// `write_batch` commits atomically (all or none) and returns the
/// contiguous sequence range written. Implementations are expected to
/// reject batches whose sequence numbers are not contiguous with the
/// current tip — this is what lets the batch coordinator treat "the store
/// write for batch *k* committing" as the visibility barrier for batch
/// *k+1* (spec §4.2).
#[async_trait]
pub trait Store: Send + Sync {
    /// Atomically persist a batch of already-sealed events, in order.
    async fn write_batch(&self, events: &[SealedEvent]) -> Result<(u64, u64)>;

    /// Fetch a single event by its opaque id.
    async fn read_by_id(&self, id: EventId) -> Result<Option<SealedEvent>>;

    /// Fetch an inclusive sequence range, in sequence order.
    async fn read_range(&self, start: u64, end: u64) -> Result<Vec<SealedEvent>>;

    /// The highest sequence number committed so far, or 0 if empty.
    async fn latest_sequence(&self) -> Result<u64>;

    /// Run a filtered, paginated query.
    async fn query(&self, criteria: &QueryCriteria) -> Result<Vec<SealedEvent>>;

    /// Count events matching a filter, ignoring pagination.
    async fn count(&self, criteria: &QueryCriteria) -> Result<u64>;
}

/// A reference, non-persistent store backed by an in-memory `BTreeMap`
/// keyed by sequence number, grounded on `toka-store-memory::MemoryBackend`'s
/// `RwLock<HashMap<..>>` pattern but generalized to sequence-ordered scans
/// and predicate filtering.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    events: RwLock<BTreeMap<u64, SealedEvent>>,
    by_id: RwLock<HashMap<EventId, u64>>,
}

impl InMemoryStore {
    /// Construct an empty store.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn write_batch(&self, batch: &[SealedEvent]) -> Result<(u64, u64)> {
        if batch.is_empty() {
            return Err(anyhow!("cannot write an empty batch"));
        }

        let mut events = self.events.write().await;
        let current_tip = events.keys().next_back().copied().unwrap_or(0);

        let mut expected = current_tip + 1;
        for event in batch {
            if event.sequence != expected {
                return Err(anyhow!(
                    "non-contiguous sequence: expected {expected}, got {}",
                    event.sequence
                ));
            }
            expected += 1;
        }

        let mut by_id = self.by_id.write().await;
        for event in batch {
            by_id.insert(event.id(), event.sequence);
            events.insert(event.sequence, event.clone());
        }

        Ok((batch.first().unwrap().sequence, batch.last().unwrap().sequence))
    }

    async fn read_by_id(&self, id: EventId) -> Result<Option<SealedEvent>> {
        let by_id = self.by_id.read().await;
        let Some(seq) = by_id.get(&id) else { return Ok(None) };
        Ok(self.events.read().await.get(seq).cloned())
    }

    async fn read_range(&self, start: u64, end: u64) -> Result<Vec<SealedEvent>> {
        if start > end {
            return Err(anyhow!("range start {start} is after end {end}"));
        }
        let events = self.events.read().await;
        Ok(events.range(start..=end).map(|(_, e)| e.clone()).collect())
    }

    async fn latest_sequence(&self) -> Result<u64> {
        Ok(self.events.read().await.keys().next_back().copied().unwrap_or(0))
    }

    async fn query(&self, criteria: &QueryCriteria) -> Result<Vec<SealedEvent>> {
        let events = self.events.read().await;
        let mut matched: Vec<SealedEvent> = events
            .values()
            .filter(|e| criteria.matches(e))
            .cloned()
            .collect();

        if criteria.sort == SortOrder::Descending {
            matched.reverse();
        }

        let offset = criteria.offset.unwrap_or(0);
        let matched = matched.into_iter().skip(offset);

        Ok(match criteria.limit {
            Some(limit) => matched.take(limit).collect(),
            None => matched.collect(),
        })
    }

    async fn count(&self, criteria: &QueryCriteria) -> Result<u64> {
        let events = self.events.read().await;
        Ok(events.values().filter(|e| criteria.matches(e)).count() as u64)
    }
}
