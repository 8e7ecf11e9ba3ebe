use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use audit_types::event::EventId;
use audit_types::{ChainTip, SealedEvent};

/// Best-effort cache contract, per spec §6: all operations degrade
/// performance on failure, never correctness. Callers must not treat a
/// cache error as a reason to fail the batch.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Fetch the last-known chain tip, if the cache has one.
    async fn get_chain_tip(&self) -> Result<Option<ChainTip>>;

    /// Record the current chain tip.
    async fn set_chain_tip(&self, tip: ChainTip) -> Result<()>;

    /// Cache a batch of recently-sealed events for fast point reads.
    async fn put_events(&self, events: &[SealedEvent]) -> Result<()>;

    /// Invalidate any cached entries overlapping `[start, end]`. Called by
    /// the integrity engine after a repair or on detecting a gap.
    async fn invalidate_range(&self, start: u64, end: u64) -> Result<()>;
}

/// A reference in-memory cache, grounded on
/// `toka-store-memory::MemoryBackend`'s dedup-by-key storage pattern.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    tip: RwLock<Option<ChainTip>>,
    events: RwLock<HashMap<EventId, SealedEvent>>,
    by_sequence: RwLock<HashMap<u64, EventId>>,
}

impl InMemoryCache {
    /// Construct an empty cache.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Look up a cached event by sequence number, if present.
    pub async fn get_by_sequence(&self, sequence: u64) -> Option<SealedEvent> {
        let by_sequence = self.by_sequence.read().await;
        let id = by_sequence.get(&sequence)?;
        self.events.read().await.get(id).cloned()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_chain_tip(&self) -> Result<Option<ChainTip>> {
        Ok(self.tip.read().await.clone())
    }

    async fn set_chain_tip(&self, tip: ChainTip) -> Result<()> {
        *self.tip.write().await = Some(tip);
        Ok(())
    }

    async fn put_events(&self, batch: &[SealedEvent]) -> Result<()> {
        let mut events = self.events.write().await;
        let mut by_sequence = self.by_sequence.write().await;
        for event in batch {
            by_sequence.insert(event.sequence, event.id());
            events.insert(event.id(), event.clone());
        }
        Ok(())
    }

    async fn invalidate_range(&self, start: u64, end: u64) -> Result<()> {
        let mut by_sequence = self.by_sequence.write().await;
        let mut events = self.events.write().await;
        for seq in start..=end {
            if let Some(id) = by_sequence.remove(&seq) {
                events.remove(&id);
            }
        }
        Ok(())
    }
}
