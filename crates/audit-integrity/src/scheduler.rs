use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use audit_types::alert::NewAlert;
use audit_types::severity::corruption_level_to_alert_severity;
use audit_types::{AlertSeverity, IntegrityConfig};

use crate::engine::{CorruptionCriteria, IntegrityEngine};
use crate::report::CorruptionLevel;

/// Notified whenever a scheduled check's result crosses an alert
/// threshold. Kept as a trait here (rather than depending on `audit-alerts`
/// directly) so the two crates have a single, one-directional edge:
/// `audit-alerts` depends on this trait, not the other way around.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Raise an alert. Implementations own their own deduplication
    /// (cooldown) policy.
    async fn raise(&self, alert: NewAlert);
}

/// The four recurring check kinds the scheduler dispatches, per spec §4.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CheckType {
    /// `verify_chain` over the most recent `incremental_check_size` sequences.
    HashChain,
    /// `verify_sequence` over the same incremental window.
    Sequence,
    /// `detect_corruption`, sampled unless the window exceeds
    /// `full_check_threshold`.
    CorruptionScan,
    /// A comprehensive check covering a rolling window (the full chain up
    /// to `full_check_threshold` sequences, or all of it if smaller).
    Comprehensive,
}

impl CheckType {
    const ALL: [CheckType; 4] =
        [CheckType::HashChain, CheckType::Sequence, CheckType::CorruptionScan, CheckType::Comprehensive];

    fn interval(&self, config: &IntegrityConfig) -> Duration {
        match self {
            CheckType::HashChain => config.hash_chain_check_interval,
            CheckType::Sequence => config.sequence_check_interval,
            CheckType::CorruptionScan => config.corruption_scan_interval,
            CheckType::Comprehensive => config.comprehensive_check_interval,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            CheckType::HashChain => "hash_chain",
            CheckType::Sequence => "sequence",
            CheckType::CorruptionScan => "corruption_scan",
            CheckType::Comprehensive => "comprehensive",
        }
    }
}

/// Fires `IntegrityEngine` checks on fixed intervals, per spec §4.5's
/// scheduler: `(check_type -> interval, next_run, enabled)` plus a bounded
/// worker pool and a per-check timeout.
pub struct IntegrityScheduler {
    engine: Arc<IntegrityEngine>,
    config: IntegrityConfig,
    alert_sink: Arc<dyn AlertSink>,
    semaphore: Arc<Semaphore>,
    shutdown: CancellationToken,
}

impl IntegrityScheduler {
    /// Construct a scheduler. Does nothing until `spawn` is called.
    pub fn new(engine: Arc<IntegrityEngine>, config: IntegrityConfig, alert_sink: Arc<dyn AlertSink>) -> Arc<Self> {
        let max_concurrent = config.max_concurrent_checks.max(1);
        Arc::new(Self {
            engine,
            config,
            alert_sink,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            shutdown: CancellationToken::new(),
        })
    }

    /// Request shutdown: the tick loop stops dispatching new checks and
    /// awaits in-flight ones (spec §4.8).
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Spawn the tick loop. A no-op background task if
    /// `enable_background_checks` is false, so callers can always spawn
    /// unconditionally.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run().await })
    }

    async fn run(self: Arc<Self>) {
        if !self.config.enable_background_checks {
            info!("integrity scheduler disabled by configuration");
            return;
        }

        let mut next_run: HashMap<CheckType, Instant> =
            CheckType::ALL.iter().map(|ct| (*ct, Instant::now())).collect();
        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let mut in_flight = Vec::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.cancelled() => {
                    info!("integrity scheduler shutting down, awaiting in-flight checks");
                    for handle in in_flight {
                        let _: Result<(), _> = handle.await;
                    }
                    return;
                }
            }

            let now = Instant::now();
            for check_type in CheckType::ALL {
                if next_run[&check_type] > now {
                    continue;
                }
                next_run.insert(check_type, now + check_type.interval(&self.config));

                let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                    warn!(check = check_type.label(), "integrity worker pool saturated, skipping this tick");
                    continue;
                };

                let engine = Arc::clone(&self.engine);
                let alert_sink = Arc::clone(&self.alert_sink);
                let check_timeout = self.config.check_timeout;
                let incremental_size = self.config.incremental_check_size;
                let full_threshold = self.config.full_check_threshold;
                let score_threshold = self.config.integrity_score_threshold;
                let corruption_threshold = self.config.corruption_threshold;

                in_flight.retain(|h: &JoinHandle<()>| !h.is_finished());
                in_flight.push(tokio::spawn(async move {
                    let _permit = permit;
                    let outcome = tokio::time::timeout(
                        check_timeout,
                        run_one_check(
                            &engine,
                            check_type,
                            incremental_size,
                            full_threshold,
                            score_threshold,
                            corruption_threshold,
                            alert_sink.as_ref(),
                        ),
                    )
                    .await;

                    match outcome {
                        Ok(()) => {}
                        Err(_elapsed) => {
                            warn!(check = check_type.label(), "integrity check exceeded its timeout, cancelled");
                        }
                    }
                }));
            }
        }
    }
}

async fn run_one_check(
    engine: &IntegrityEngine,
    check_type: CheckType,
    incremental_size: u64,
    full_threshold: u64,
    score_threshold: f64,
    corruption_threshold: f64,
    alert_sink: &dyn AlertSink,
) {
    let cancel = CancellationToken::new();
    let tip = engine.store_latest_sequence().await.unwrap_or(0);
    if tip == 0 {
        return;
    }

    match check_type {
        CheckType::HashChain => {
            let start = tip.saturating_sub(incremental_size).max(1);
            match engine.verify_chain(start, tip, &cancel).await {
                Ok(report) if !report.incomplete && report.integrity_score < score_threshold => {
                    alert_sink
                        .raise(NewAlert {
                            alert_type: "hash_chain_integrity".into(),
                            severity: AlertSeverity::Critical,
                            title: "Hash chain integrity below threshold".into(),
                            description: format!(
                                "verify_chain({start},{tip}) scored {:.4}, below threshold {score_threshold:.4}",
                                report.integrity_score
                            ),
                            detail: serde_json::json!({ "failed_sequences": report.failed_sequences }),
                        })
                        .await;
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "hash chain check failed"),
            }
        }
        CheckType::Sequence => {
            let start = tip.saturating_sub(incremental_size).max(1);
            match engine.verify_sequence(start, tip, &cancel).await {
                Ok(report) if !report.incomplete && !report.is_valid() => {
                    alert_sink
                        .raise(NewAlert {
                            alert_type: "sequence_integrity_issue".into(),
                            severity: AlertSeverity::Warning,
                            title: "Sequence gap or duplicate detected".into(),
                            description: format!(
                                "gaps={} duplicates={} out_of_order={}",
                                report.gaps_found(),
                                report.duplicates_found(),
                                report.out_of_order.len()
                            ),
                            detail: serde_json::json!({
                                "gaps": report.gaps,
                                "duplicates": report.duplicates,
                            }),
                        })
                        .await;
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "sequence check failed"),
            }
        }
        CheckType::CorruptionScan => {
            let start = tip.saturating_sub(incremental_size).max(1);
            let criteria = CorruptionCriteria { range: (start, tip), sample_rate: None };
            match engine.detect_corruption(&criteria, &cancel).await {
                Ok(report) if !report.incomplete && report.corruption_ratio > corruption_threshold => {
                    alert_sink
                        .raise(NewAlert {
                            alert_type: "corruption_detected".into(),
                            severity: corruption_level_to_alert_severity(report.level.as_str()),
                            title: "Event corruption detected".into(),
                            description: format!(
                                "{} of {} events in [{start},{tip}] failed corruption checks (ratio {:.4})",
                                report.corrupted_sequences.len(),
                                report.total_count,
                                report.corruption_ratio
                            ),
                            detail: serde_json::json!({ "corrupted_sequences": report.corrupted_sequences }),
                        })
                        .await;
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "corruption scan failed"),
            }
        }
        CheckType::Comprehensive => {
            let start = tip.saturating_sub(full_threshold).max(1);
            let criteria = CorruptionCriteria { range: (start, tip), sample_rate: None };
            match engine.detect_corruption(&criteria, &cancel).await {
                Ok(report)
                    if !report.incomplete
                        && matches!(report.level, CorruptionLevel::High | CorruptionLevel::Severe) =>
                {
                    alert_sink
                        .raise(NewAlert {
                            alert_type: "corruption_detected".into(),
                            severity: corruption_level_to_alert_severity(report.level.as_str()),
                            title: "Comprehensive scan found corruption".into(),
                            description: format!(
                                "rolling window [{start},{tip}]: {} of {} events corrupted",
                                report.corrupted_sequences.len(),
                                report.total_count
                            ),
                            detail: serde_json::json!({ "corrupted_sequences": report.corrupted_sequences }),
                        })
                        .await;
                }
                Ok(_) => {}
                Err(err) => warn!(%err, "comprehensive check failed"),
            }
        }
    }
}
