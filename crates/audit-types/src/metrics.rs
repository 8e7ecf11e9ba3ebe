use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free counters updated with atomic operations; snapshots are
/// lock-free reads, per spec §5's shared-resource policy.
#[derive(Debug, Default)]
pub struct EventMetrics {
    events_ingested: AtomicU64,
    events_dropped: AtomicU64,
    events_sealed: AtomicU64,
    batches_sealed: AtomicU64,
    store_write_failures: AtomicU64,
    breaker_opens: AtomicU64,
    mailbox_drops: AtomicU64,
    rate_limit_drops: AtomicU64,
}

/// A point-in-time read of `EventMetrics`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Total events admitted to the ingestion queue.
    pub events_ingested: u64,
    /// Total events dropped under backpressure (queue-full drop policy).
    pub events_dropped: u64,
    /// Total events sealed (assigned sequence + hash).
    pub events_sealed: u64,
    /// Total batches sealed.
    pub batches_sealed: u64,
    /// Total store-write failures observed by batch workers.
    pub store_write_failures: u64,
    /// Total times a commit attempt observed the circuit breaker open.
    pub breaker_opens: u64,
    /// Total streamer events dropped due to a full connection mailbox.
    pub mailbox_drops: u64,
    /// Total streamer events dropped due to an empty rate-limit bucket.
    pub rate_limit_drops: u64,
}

impl EventMetrics {
    /// Construct a fresh, zeroed counter set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one admitted event.
    pub fn record_ingested(&self) {
        self.events_ingested.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `n` dropped events.
    pub fn record_dropped(&self, n: u64) {
        self.events_dropped.fetch_add(n, Ordering::Relaxed);
    }

    /// Record `n` sealed events as part of one sealed batch.
    pub fn record_batch_sealed(&self, n: u64) {
        self.events_sealed.fetch_add(n, Ordering::Relaxed);
        self.batches_sealed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one store-write failure.
    pub fn record_store_failure(&self) {
        self.store_write_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one commit attempt that observed the breaker open.
    pub fn record_breaker_open(&self) {
        self.breaker_opens.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one mailbox-full drop at the streamer.
    pub fn record_mailbox_drop(&self) {
        self.mailbox_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one rate-limit drop at the streamer.
    pub fn record_rate_limit_drop(&self) {
        self.rate_limit_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot for a status endpoint. Individual
    /// counters may interleave with concurrent writers; that is acceptable
    /// for monitoring purposes.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            events_ingested: self.events_ingested.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_sealed: self.events_sealed.load(Ordering::Relaxed),
            batches_sealed: self.batches_sealed.load(Ordering::Relaxed),
            store_write_failures: self.store_write_failures.load(Ordering::Relaxed),
            breaker_opens: self.breaker_opens.load(Ordering::Relaxed),
            mailbox_drops: self.mailbox_drops.load(Ordering::Relaxed),
            rate_limit_drops: self.rate_limit_drops.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = EventMetrics::new();
        m.record_ingested();
        m.record_ingested();
        m.record_dropped(3);
        let snap = m.snapshot();
        assert_eq!(snap.events_ingested, 2);
        assert_eq!(snap.events_dropped, 3);
    }
}
