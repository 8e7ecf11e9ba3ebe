use std::collections::BTreeMap;
use std::sync::Arc;

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use audit_ingest::{EventDraft, Ingestor, RequestContext};
use audit_store::{Cache, Store};
use audit_types::event::{Actor, TargetRef};

use crate::keyring::EpochKeyring;
use crate::report::{ChainReport, CorruptionLevel, CorruptionReport, RepairOutcome, SequenceReport};

/// Criteria for `detect_corruption`: an inclusive sequence range plus an
/// optional sample rate for scans too large to run deep, per spec §4.5.
#[derive(Debug, Clone)]
pub struct CorruptionCriteria {
    /// Inclusive sequence range to scan.
    pub range: (u64, u64),
    /// Fraction of the range to examine, in `(0, 1]`. `None` means a deep
    /// (exhaustive) scan.
    pub sample_rate: Option<f64>,
}

/// Options controlling `repair_chain`.
#[derive(Debug, Clone, Default)]
pub struct RepairOptions {
    /// Actor id attributed to the repair-audit event.
    pub initiated_by: String,
}

/// Periodic + on-demand chain, sequence, and corruption verification, per
/// spec §4.5. Reads exclusively through the store — never the in-flight
/// pipeline — so integrity work never blocks ingestion.
pub struct IntegrityEngine {
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    keyring: EpochKeyring,
    repair_sink: Option<Arc<Ingestor>>,
    chain_repair_enabled: bool,
}

impl IntegrityEngine {
    /// Construct an engine. `repair_sink` is the ingestor through which
    /// repair-audit events are submitted; pass `None` to disable
    /// `repair_chain` regardless of `chain_repair_enabled`.
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        keyring: EpochKeyring,
        repair_sink: Option<Arc<Ingestor>>,
        chain_repair_enabled: bool,
    ) -> Self {
        Self { store, cache, keyring, repair_sink, chain_repair_enabled }
    }

    /// The store's current tip, for the scheduler's incremental-window
    /// checks. `Ok(0)` means an empty store.
    pub async fn store_latest_sequence(&self) -> Result<u64, audit_types::AuditError> {
        self.store
            .latest_sequence()
            .await
            .map_err(|e| audit_types::AuditError::TransientStore(e.to_string()))
    }

    /// Recompute and compare every event's hash and linkage in
    /// `[start, end]` against what the sealer would have produced.
    pub async fn verify_chain(
        &self,
        start: u64,
        end: u64,
        cancel: &CancellationToken,
    ) -> Result<ChainReport, audit_types::AuditError> {
        if start > end {
            return Err(audit_types::AuditError::Validation(format!(
                "verify_chain range start {start} is after end {end}"
            )));
        }

        let mut previous_hash = if start > 1 {
            self.store
                .read_range(start - 1, start - 1)
                .await
                .map_err(|e| audit_types::AuditError::TransientStore(e.to_string()))?
                .first()
                .map(|e| e.hash.clone())
        } else {
            Some(String::new())
        };

        let events = self
            .store
            .read_range(start, end)
            .await
            .map_err(|e| audit_types::AuditError::TransientStore(e.to_string()))?;

        let mut failed = Vec::new();
        let mut examined = 0u64;
        let mut incomplete = false;

        for event in &events {
            if cancel.is_cancelled() {
                incomplete = true;
                break;
            }

            examined += 1;
            let hash_ok = match self.keyring.resolve(event.epoch) {
                Some(sealer) => sealer.verify_hash(event).unwrap_or(false),
                None => {
                    warn!(epoch = event.epoch, "no sealer registered for epoch, treating as unverifiable");
                    false
                }
            };
            let link_ok = previous_hash.as_deref().map(|h| h == event.previous_hash).unwrap_or(true);

            if !hash_ok || !link_ok {
                failed.push(event.sequence);
            }
            previous_hash = Some(event.hash.clone());
        }

        Ok(ChainReport::compute((start, end), examined, failed, incomplete))
    }

    /// Detect sequence gaps, duplicates, and out-of-order timestamps in
    /// `[start, end]`.
    pub async fn verify_sequence(
        &self,
        start: u64,
        end: u64,
        cancel: &CancellationToken,
    ) -> Result<SequenceReport, audit_types::AuditError> {
        if start > end {
            return Err(audit_types::AuditError::Validation(format!(
                "verify_sequence range start {start} is after end {end}"
            )));
        }

        let events = self
            .store
            .read_range(start, end)
            .await
            .map_err(|e| audit_types::AuditError::TransientStore(e.to_string()))?;

        let mut seen: BTreeMap<u64, String> = BTreeMap::new();
        let mut duplicates = Vec::new();
        let mut out_of_order = Vec::new();
        let mut incomplete = false;
        let mut last_timestamp = None;

        for event in &events {
            if cancel.is_cancelled() {
                incomplete = true;
                break;
            }

            if let Some(existing) = seen.get(&event.sequence) {
                if existing != &event.hash {
                    duplicates.push(event.sequence);
                }
            } else {
                seen.insert(event.sequence, event.hash.clone());
            }

            if let Some(prev) = last_timestamp {
                if event.event.timestamp < prev {
                    out_of_order.push(event.sequence);
                }
            }
            last_timestamp = Some(event.event.timestamp);
        }

        let gaps: Vec<u64> = (start..=end).filter(|seq| !seen.contains_key(seq)).collect();

        Ok(SequenceReport { range: (start, end), gaps, duplicates, out_of_order, incomplete })
    }

    /// Deep or sampled scan combining hash recomputation, schema validity,
    /// and reference-integrity checks.
    pub async fn detect_corruption(
        &self,
        criteria: &CorruptionCriteria,
        cancel: &CancellationToken,
    ) -> Result<CorruptionReport, audit_types::AuditError> {
        let (start, end) = criteria.range;
        if start > end {
            return Err(audit_types::AuditError::Validation(format!(
                "detect_corruption range start {start} is after end {end}"
            )));
        }

        let events = self
            .store
            .read_range(start, end)
            .await
            .map_err(|e| audit_types::AuditError::TransientStore(e.to_string()))?;

        let sampled = criteria.sample_rate.is_some();
        let mut rng = rand::thread_rng();
        let mut corrupted = Vec::new();
        let mut examined = 0u64;
        let mut incomplete = false;

        for event in &events {
            if cancel.is_cancelled() {
                incomplete = true;
                break;
            }

            if let Some(rate) = criteria.sample_rate {
                if !rng.gen_bool(rate.clamp(0.0, 1.0)) {
                    continue;
                }
            }
            examined += 1;

            let hash_ok = match self.keyring.resolve(event.epoch) {
                Some(sealer) => sealer.verify_hash(event).unwrap_or(false),
                None => false,
            };
            let schema_ok = !event.event.actor.id.trim().is_empty()
                && !event.event.target.id.trim().is_empty()
                && !event.event.event_type.trim().is_empty();

            if !hash_ok || !schema_ok {
                corrupted.push(event.sequence);
            }
        }

        let ratio = if examined == 0 { 0.0 } else { corrupted.len() as f64 / examined as f64 };
        let level = if corrupted.len() as u64 == examined && examined > 0 {
            CorruptionLevel::Severe
        } else if ratio > 0.1 {
            CorruptionLevel::High
        } else if ratio > 0.0 {
            CorruptionLevel::Medium
        } else {
            CorruptionLevel::Low
        };

        Ok(CorruptionReport {
            range: (start, end),
            corrupted_sequences: corrupted,
            total_count: examined,
            corruption_ratio: ratio,
            level,
            sampled,
            incomplete,
        })
    }

    /// Repair never rewrites stored history directly (spec §9): it runs
    /// `verify_chain` over `[start, end]`, appends exactly one repair-audit
    /// event documenting the findings through the normal ingestion
    /// pipeline, and invalidates the cache's view of the range so readers
    /// stop serving stale cached entries.
    pub async fn repair_chain(
        &self,
        start: u64,
        end: u64,
        options: RepairOptions,
    ) -> Result<RepairOutcome, audit_types::AuditError> {
        if !self.chain_repair_enabled {
            return Err(audit_types::AuditError::Lifecycle(
                "chain repair is disabled by configuration".into(),
            ));
        }

        let cancel = CancellationToken::new();
        let report = self.verify_chain(start, end, &cancel).await?;

        if let Err(err) = self.cache.invalidate_range(start, end).await {
            warn!(%err, "failed to invalidate cached range after repair (non-fatal)");
        }

        let repair_event_id = match &self.repair_sink {
            Some(ingestor) => {
                let mut attributes = BTreeMap::new();
                attributes.insert(
                    "repaired_range".to_string(),
                    serde_json::json!([start, end]),
                );
                attributes.insert(
                    "failed_sequences".to_string(),
                    serde_json::json!(report.failed_sequences),
                );

                let draft = EventDraft {
                    event_type: "integrity.repair".into(),
                    actor: Actor::new(if options.initiated_by.is_empty() {
                        "integrity-engine".to_string()
                    } else {
                        options.initiated_by
                    }),
                    target: TargetRef::new(format!("chain:{start}-{end}")),
                    action: "repair".into(),
                    result: if report.is_valid { "success" } else { "partial" }.into(),
                    data_classes: Default::default(),
                    legal_basis: None,
                    compliance_attributes: BTreeMap::new(),
                    attributes,
                };

                match ingestor.log_event(draft, &RequestContext::empty()).await {
                    audit_types::LogOutcome::Ok { event_id } => Some(event_id),
                    other => {
                        warn!(?other, "repair-audit event was not admitted");
                        None
                    }
                }
            }
            None => None,
        };

        Ok(RepairOutcome {
            range: (start, end),
            corrupted_sequences: report.failed_sequences,
            repair_event_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_chain::Sealer;
    use audit_store::InMemoryStore;
    use audit_types::config::HashSecretKey;
    use audit_types::event::{EventTimestamp, UnsealedEvent};
    use audit_types::{ChainTip, Severity};

    async fn sealed_chain(n: u64, key: Vec<u8>) -> (Arc<InMemoryStore>, EpochKeyring) {
        let sealer = Sealer::new(HashSecretKey::from_bytes(key), 0).unwrap();
        let mut tip = ChainTip::genesis(0);
        let store = InMemoryStore::new();
        let mut keyring = EpochKeyring::new();
        keyring.register(sealer.clone());

        let batch: Vec<_> = (0..n)
            .map(|i| {
                let ev = UnsealedEvent {
                    id: Uuid::new_v4(),
                    event_type: "auth.login".into(),
                    severity: Severity::Low,
                    actor: Actor::new(format!("actor-{i}")),
                    target: TargetRef::new("t1"),
                    action: "login".into(),
                    result: "success".into(),
                    timestamp: EventTimestamp { wall: chrono::Utc::now(), monotonic_nanos: i },
                    data_classes: Default::default(),
                    legal_basis: None,
                    compliance_attributes: BTreeMap::new(),
                    attributes: BTreeMap::new(),
                };
                sealer.seal(ev, &mut tip).unwrap()
            })
            .collect();

        store.write_batch(&batch).await.unwrap();
        (store, keyring)
    }

    #[tokio::test]
    async fn verify_chain_succeeds_on_untampered_range() {
        let (store, keyring) = sealed_chain(10, vec![1u8; 32]).await;
        let cache = audit_store::InMemoryCache::new();
        let engine = IntegrityEngine::new(store, cache, keyring, None, false);

        let report = engine.verify_chain(1, 10, &CancellationToken::new()).await.unwrap();
        assert!(report.is_valid);
        assert_eq!(report.integrity_score, 1.0);
        assert!(report.failed_sequences.is_empty());
    }

    #[tokio::test]
    async fn verify_chain_rejects_inverted_range() {
        let (store, keyring) = sealed_chain(3, vec![2u8; 32]).await;
        let cache = audit_store::InMemoryCache::new();
        let engine = IntegrityEngine::new(store, cache, keyring, None, false);

        let err = engine.verify_chain(5, 1, &CancellationToken::new()).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn verify_sequence_detects_a_gap_past_the_stored_tip() {
        let (store, keyring) = sealed_chain(10, vec![3u8; 32]).await;
        let cache = audit_store::InMemoryCache::new();
        let engine = IntegrityEngine::new(store, cache, keyring, None, false);

        // Only sequences 1..10 were ever written; probing a wider range
        // than what is stored is exactly how an out-of-band deletion (the
        // store's own write path refuses to produce gaps) would surface.
        let report = engine.verify_sequence(1, 12, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.gaps, vec![11, 12]);
        assert!(!report.is_valid());
    }

    #[tokio::test]
    async fn verify_sequence_clean_range_is_valid() {
        let (store, keyring) = sealed_chain(10, vec![3u8; 32]).await;
        let cache = audit_store::InMemoryCache::new();
        let engine = IntegrityEngine::new(store, cache, keyring, None, false);

        let report = engine.verify_sequence(1, 10, &CancellationToken::new()).await.unwrap();
        assert!(report.is_valid());
    }

    #[tokio::test]
    async fn detect_corruption_flags_a_tampered_hash() {
        let (store, keyring) = sealed_chain(5, vec![4u8; 32]).await;
        {
            let events = store.read_range(1, 5).await.unwrap();
            let mut tampered = events[2].clone();
            tampered.hash = "00".repeat(32);
            // Re-seat the tampered copy directly in the backing map via a
            // second store carrying only the one corrupted sequence's
            // worth of history, isolating the check to that one event.
            let isolated = InMemoryStore::new();
            let mut first_two = events[..2].to_vec();
            first_two.push(tampered);
            isolated.write_batch(&first_two).await.unwrap();

            let cache = audit_store::InMemoryCache::new();
            let engine = IntegrityEngine::new(isolated, cache, keyring.clone(), None, false);
            let criteria = CorruptionCriteria { range: (1, 3), sample_rate: None };
            let report = engine.detect_corruption(&criteria, &CancellationToken::new()).await.unwrap();
            assert!(!report.is_valid());
            assert_eq!(report.corrupted_sequences, vec![3]);
        }

        let cache = audit_store::InMemoryCache::new();
        let engine = IntegrityEngine::new(store, cache, keyring, None, false);
        let criteria = CorruptionCriteria { range: (1, 5), sample_rate: None };
        let report = engine.detect_corruption(&criteria, &CancellationToken::new()).await.unwrap();
        assert!(report.is_valid());
    }

    #[tokio::test]
    async fn repair_chain_requires_flag_enabled() {
        let (store, keyring) = sealed_chain(3, vec![5u8; 32]).await;
        let cache = audit_store::InMemoryCache::new();
        let engine = IntegrityEngine::new(store, cache, keyring, None, false);
        let result = engine.repair_chain(1, 3, RepairOptions::default()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn repair_chain_emits_exactly_one_audit_event() {
        let (store, keyring) = sealed_chain(3, vec![6u8; 32]).await;
        let cache = audit_store::InMemoryCache::new();

        let mut logger_cfg = audit_types::LoggerConfig::default();
        logger_cfg.buffer_size = 10;
        let metrics = Arc::new(audit_types::EventMetrics::new());
        let ingestor = Arc::new(Ingestor::new(logger_cfg, metrics));

        let engine = IntegrityEngine::new(store, cache, keyring, Some(Arc::clone(&ingestor)), true);
        let outcome = engine.repair_chain(1, 3, RepairOptions::default()).await.unwrap();
        assert!(outcome.repair_event_id.is_some());
        assert_eq!(ingestor.queue().len().await, 1);
    }
}
