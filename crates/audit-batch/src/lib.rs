#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **audit-batch** – Batch coordinator & worker pool, per spec §4.2.
//!
//! Drains `audit-ingest`'s queue into size/time-bounded batches, seals them
//! under the chain-tip lock via `audit-chain::Sealer`, and commits them to
//! the store under `audit-breaker::CircuitBreaker`, caching and publishing
//! on success. Commits are strictly serialized: the store's contiguous-
//! sequence check (spec §6) makes the write for batch *k* the visibility
//! barrier for batch *k+1*, so there is nothing to gain from letting two
//! commits race and every incentive to avoid the wasted, guaranteed-to-be-
//! rejected work that would cause.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use audit_breaker::{BreakerError, BreakerState, CircuitBreaker};
use audit_chain::Sealer;
use audit_ingest::IngestQueue;
use audit_integrity::AlertSink;
use audit_store::{Cache, Publisher, Store};
use audit_types::alert::NewAlert;
use audit_types::{AlertSeverity, ChainTip, EventMetrics, LoggerConfig};

/// How long a worker waits on a breaker-open or probe-in-flight rejection
/// before retrying the commit. Short enough to notice recovery quickly,
/// long enough not to spin the breaker's mutex.
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Drains the ingestion queue, seals, writes, caches, and publishes.
pub struct BatchCoordinator {
    queue: Arc<IngestQueue>,
    sealer: Sealer,
    tip: Arc<Mutex<ChainTip>>,
    store: Arc<dyn Store>,
    cache: Arc<dyn Cache>,
    publisher: Arc<dyn Publisher>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<EventMetrics>,
    config: LoggerConfig,
    commit_lock: Mutex<()>,
    shutdown: CancellationToken,
    draining: AtomicBool,
    alert_sink: Arc<dyn AlertSink>,
}

impl BatchCoordinator {
    /// Assemble a coordinator. `tip` should be primed from the cache/store's
    /// last-known chain tip at startup (spec §4.8); a fresh genesis tip is
    /// used if the caller has none. `alert_sink` receives a critical alert
    /// whenever the circuit breaker opens, per spec §4.2/§8 scenario 6.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: LoggerConfig,
        queue: Arc<IngestQueue>,
        sealer: Sealer,
        tip: ChainTip,
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        publisher: Arc<dyn Publisher>,
        metrics: Arc<EventMetrics>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Arc<Self> {
        let breaker = Arc::new(CircuitBreaker::new(config.failure_threshold, config.circuit_timeout));
        Arc::new(Self {
            queue,
            sealer,
            tip: Arc::new(Mutex::new(tip)),
            store,
            cache,
            publisher,
            breaker,
            metrics,
            config,
            commit_lock: Mutex::new(()),
            shutdown: CancellationToken::new(),
            draining: AtomicBool::new(false),
            alert_sink,
        })
    }

    /// Current chain tip, for status reporting and integrity checks.
    pub async fn chain_tip(&self) -> ChainTip {
        self.tip.lock().await.clone()
    }

    /// Current circuit breaker state, surfaced through the health endpoint.
    pub async fn breaker_state(&self) -> BreakerState {
        self.breaker.state().await
    }

    /// Current depth of the admission queue this coordinator drains.
    pub async fn queue_depth(&self) -> usize {
        self.queue.len().await
    }

    /// Spawn `config.batch_workers` worker tasks. Each independently drains
    /// batches and commits them; commits serialize via the internal commit
    /// lock regardless of how many workers are running.
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.config.batch_workers.max(1))
            .map(|id| {
                let coordinator = Arc::clone(self);
                tokio::spawn(async move { coordinator.run_worker(id).await })
            })
            .collect()
    }

    /// Signal all workers to drain the remaining queue and stop, per spec
    /// §4.8's graceful shutdown: in-flight and queued events are sealed and
    /// written before workers return.
    pub fn begin_shutdown(&self) {
        self.draining.store(true, Ordering::SeqCst);
    }

    /// Abort any in-progress breaker-open retry wait so shutdown does not
    /// hang indefinitely behind a sustained store outage. Already-sealed
    /// events that could not be written are logged and left for the next
    /// startup's integrity check to flag as a sequence gap.
    pub fn cancel_retries(&self) {
        self.shutdown.cancel();
    }

    async fn run_worker(self: Arc<Self>, worker_id: usize) {
        loop {
            let batch = self.collect_batch().await;
            if batch.is_empty() {
                if self.draining.load(Ordering::SeqCst) && self.queue.is_empty().await {
                    info!(worker_id, "batch worker draining complete, exiting");
                    return;
                }
                continue;
            }

            self.commit(batch).await;

            if self.draining.load(Ordering::SeqCst) && self.queue.is_empty().await {
                info!(worker_id, "batch worker draining complete, exiting");
                return;
            }
        }
    }

    /// Wait until either `batch_size` events are queued or `batch_timeout`
    /// elapses, then drain up to `batch_size` events. Returns an empty
    /// batch if nothing was queued when the timeout fired.
    async fn collect_batch(&self) -> Vec<audit_types::event::UnsealedEvent> {
        if self.queue.len().await >= self.config.batch_size {
            return self.queue.drain(self.config.batch_size).await;
        }

        let deadline = tokio::time::sleep(self.config.batch_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = self.queue.notified() => {
                    if self.queue.len().await >= self.config.batch_size {
                        return self.queue.drain(self.config.batch_size).await;
                    }
                }
                _ = &mut deadline => {
                    return self.queue.drain(self.config.batch_size).await;
                }
            }
        }
    }

    /// Seal, write, cache, and publish one batch. Retries the store write
    /// under the circuit breaker until it succeeds or shutdown is
    /// cancelled; the commit lock keeps this strictly serialized with every
    /// other worker's commit.
    async fn commit(&self, batch: Vec<audit_types::event::UnsealedEvent>) {
        let _commit_guard = self.commit_lock.lock().await;

        let sealed = {
            let mut tip = self.tip.lock().await;
            let mut sealed = Vec::with_capacity(batch.len());
            for event in batch {
                match self.sealer.seal(event, &mut tip) {
                    Ok(s) => sealed.push(s),
                    Err(err) => {
                        // The ingestor already validated this event; a
                        // failure here means the event was mutated between
                        // admission and sealing, which should not happen
                        // under the pipeline's ownership rules.
                        error!(%err, "event failed to seal after admission, dropping");
                    }
                }
            }
            sealed
        };

        if sealed.is_empty() {
            return;
        }

        let mut breaker_alert_raised = false;

        loop {
            match self.breaker.try_acquire().await {
                Ok(permit) => {
                    let write = tokio::time::timeout(
                        self.config.write_timeout,
                        self.store.write_batch(&sealed),
                    )
                    .await;

                    match write {
                        Ok(Ok((start, end))) => {
                            permit.on_success().await;
                            self.metrics.record_batch_sealed(sealed.len() as u64);
                            info!(start, end, count = sealed.len(), "batch committed");

                            let tip_snapshot = self.tip.lock().await.clone();
                            if let Err(err) = self.cache.set_chain_tip(tip_snapshot).await {
                                warn!(%err, "failed to cache chain tip (non-fatal)");
                            }
                            if let Err(err) = self.cache.put_events(&sealed).await {
                                warn!(%err, "failed to cache sealed batch (non-fatal)");
                            }
                            for event in &sealed {
                                self.publisher.publish(event.clone()).await;
                            }
                            return;
                        }
                        Ok(Err(err)) => {
                            permit.on_failure().await;
                            self.metrics.record_store_failure();
                            warn!(%err, "store write failed, will retry under breaker");
                        }
                        Err(_elapsed) => {
                            permit.on_failure().await;
                            self.metrics.record_store_failure();
                            warn!(timeout = ?self.config.write_timeout, "store write timed out, will retry under breaker");
                        }
                    }
                }
                Err(BreakerError::Open) => {
                    self.metrics.record_breaker_open();
                    warn!(count = sealed.len(), "circuit breaker open, holding sealed batch for retry");

                    if !breaker_alert_raised {
                        breaker_alert_raised = true;
                        self.alert_sink
                            .raise(NewAlert {
                                alert_type: "store_failure".into(),
                                severity: AlertSeverity::Critical,
                                title: "circuit breaker open: store writes are failing".into(),
                                description: format!(
                                    "{} sealed events are held pending store recovery",
                                    sealed.len()
                                ),
                                detail: serde_json::json!({
                                    "held_events": sealed.len(),
                                    "first_sequence": sealed.first().map(|e| e.sequence),
                                    "last_sequence": sealed.last().map(|e| e.sequence),
                                }),
                            })
                            .await;
                    }
                }
                Err(BreakerError::ProbeInFlight) => {}
            }

            tokio::select! {
                _ = tokio::time::sleep(RETRY_BACKOFF) => {}
                _ = self.shutdown.cancelled() => {
                    error!(
                        count = sealed.len(),
                        start = sealed.first().map(|e| e.sequence),
                        end = sealed.last().map(|e| e.sequence),
                        "shutdown cancelled pending commit; sealed events were not written"
                    );
                    return;
                }
            }
        }
    }
}
