use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use audit_alerts::AlertManager;
use audit_batch::BatchCoordinator;
use audit_chain::Sealer;
use audit_ingest::{EventDraft, Ingestor, RequestContext};
use audit_integrity::{EpochKeyring, IntegrityEngine, IntegrityScheduler};
use audit_store::{BroadcastPublisher, Cache, Publisher, Store};
use audit_types::{AuditError, ChainTip, EventMetrics, LogOutcome};

use crate::config::AuditConfig;
use crate::status::{breaker_state_label, StatusSnapshot};

/// Summary returned by `AuditPipeline::shutdown`: how many queued events
/// could not be flushed before `shutdown_timeout` elapsed (spec §4.8). A
/// nonzero count means the next startup's integrity check will find a
/// sequence gap at the tail of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Events still sitting in the admission queue when shutdown gave up
    /// waiting for the drain.
    pub unflushed_events: usize,
}

/// Wires every `audit-*` crate into one running pipeline, per spec §4:
/// ingestion → batching/sealing → store/cache/publish, with integrity
/// checks, alerting, and subscriber fan-out running alongside it.
///
/// Construction loads the chain tip from the cache, falling back to the
/// store, per spec §3: "Chain state... Lifecycle: loaded at startup from
/// cache, falling back to the store."
pub struct AuditPipeline {
    ingestor: Arc<Ingestor>,
    batch: Arc<BatchCoordinator>,
    scheduler: Arc<IntegrityScheduler>,
    alerts: Arc<AlertManager>,
    streamer: Arc<audit_streamer::Streamer>,
    metrics: Arc<EventMetrics>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown_timeout: std::time::Duration,
}

impl AuditPipeline {
    /// Build and start every subsystem: primes the chain tip, constructs
    /// the sealer/keyring/ingestor/batch coordinator/integrity
    /// engine+scheduler/alert manager/streamer, and spawns their background
    /// tasks. Returns a handle ready to accept `log_event` calls.
    pub async fn start(
        config: AuditConfig,
        secret_key: audit_types::config::HashSecretKey,
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
    ) -> Result<Arc<Self>, AuditError> {
        let metrics = Arc::new(EventMetrics::new());

        let sealer = Sealer::new(secret_key, config.epoch)?;
        let tip = load_chain_tip(&*cache, &*store, config.epoch).await?;

        let publisher = Arc::new(BroadcastPublisher::new(config.streamer.event_buffer_size));

        let ingestor = Arc::new(Ingestor::new(config.logger.clone(), Arc::clone(&metrics)));

        let alerts = AlertManager::new(config.alerts.clone(), config.integrity.alert_cooldown);

        let batch = BatchCoordinator::new(
            config.logger.clone(),
            ingestor.queue(),
            sealer.clone(),
            tip,
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&publisher) as Arc<dyn Publisher>,
            Arc::clone(&metrics),
            Arc::clone(&alerts) as Arc<dyn audit_integrity::AlertSink>,
        );

        let mut keyring = EpochKeyring::new();
        keyring.register(sealer);
        let repair_sink = config.integrity.chain_repair_enabled.then(|| Arc::clone(&ingestor));
        let integrity_engine = Arc::new(IntegrityEngine::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            keyring,
            repair_sink,
            config.integrity.chain_repair_enabled,
        ));

        let scheduler =
            IntegrityScheduler::new(integrity_engine, config.integrity.clone(), Arc::clone(&alerts) as Arc<dyn audit_integrity::AlertSink>);

        let streamer = audit_streamer::Streamer::new(Arc::clone(&publisher), Arc::clone(&metrics), config.streamer.clone());

        let mut handles = batch.spawn_workers();
        handles.push(scheduler.spawn());
        handles.push(alerts.spawn_sweeper());
        handles.extend(streamer.spawn());

        info!("audit pipeline started");

        Ok(Arc::new(Self {
            ingestor,
            batch,
            scheduler,
            alerts,
            streamer,
            metrics,
            handles: Mutex::new(handles),
            shutdown_timeout: config.shutdown_timeout,
        }))
    }

    /// Submit one audit event. This is the pipeline's entire synchronous
    /// admission contract (spec §4.1) — the caller gets an outcome without
    /// waiting for sealing, writing, or publishing.
    pub async fn log_event(&self, draft: EventDraft, ctx: &RequestContext) -> LogOutcome {
        self.ingestor.log_event(draft, ctx).await
    }

    /// Accept a new subscriber connection (spec §4.7).
    pub fn accept_subscriber(&self, user: Option<String>) -> audit_streamer::AcceptOutcome {
        self.streamer.accept(user)
    }

    /// Handle one parsed client frame from an accepted subscriber connection.
    pub async fn handle_subscriber_frame(
        &self,
        connection_id: uuid::Uuid,
        frame: audit_streamer::ClientFrame,
    ) -> Option<audit_streamer::ServerFrame> {
        self.streamer.handle_client_frame(connection_id, frame).await
    }

    /// A point-in-time health snapshot combining every subsystem's state.
    pub async fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            metrics: self.metrics.snapshot(),
            chain_tip: self.batch.chain_tip().await,
            breaker_state: breaker_state_label(self.batch.breaker_state().await),
            queue_depth: self.batch.queue_depth().await,
            active_connections: self.streamer.connection_count(),
            alerts: self.alerts.summary().await,
        }
    }

    /// Graceful shutdown, per spec §4.8: stop accepting new events, wait up
    /// to `shutdown_timeout` for the admission queue to drain, then stop
    /// the integrity scheduler (awaiting in-flight checks), the alert
    /// sweeper, and the streamer (closing every connection with a
    /// `shutdown` frame). Any events still queued when the timeout elapses
    /// are reported, not silently dropped.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.ingestor.begin_shutdown();
        self.batch.begin_shutdown();

        let drained = tokio::time::timeout(self.shutdown_timeout, async {
            while self.batch.queue_depth().await > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok();

        if !drained {
            let remaining = self.batch.queue_depth().await;
            warn!(remaining, "shutdown timed out waiting for queue drain");
        }

        // Unconditional: `queue_depth` reaching 0 only means the admission
        // queue is empty, not that every worker's `commit` has returned — a
        // worker can be stuck retrying a sealed batch against an open
        // breaker with nothing left in the queue. Cancelling always, not
        // just on a drain timeout, is what keeps the `handle.await` below
        // bounded under a sustained store outage.
        self.batch.cancel_retries();

        self.scheduler.begin_shutdown();
        self.alerts.begin_shutdown();
        self.streamer.begin_shutdown().await;

        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            let _: Result<(), _> = handle.await;
        }

        let unflushed_events = self.batch.queue_depth().await;
        info!(unflushed_events, "audit pipeline shut down");
        ShutdownReport { unflushed_events }
    }
}

async fn load_chain_tip(cache: &dyn Cache, store: &dyn Store, epoch: u32) -> Result<ChainTip, AuditError> {
    if let Ok(Some(tip)) = cache.get_chain_tip().await {
        if tip.epoch == epoch {
            return Ok(tip);
        }
    }

    let latest = store
        .latest_sequence()
        .await
        .map_err(|e| AuditError::TransientStore(e.to_string()))?;

    if latest == 0 {
        return Ok(ChainTip::genesis(epoch));
    }

    let last = store
        .read_range(latest, latest)
        .await
        .map_err(|e| AuditError::TransientStore(e.to_string()))?;

    match last.into_iter().next() {
        Some(event) if event.epoch == epoch => Ok(ChainTip { epoch, last_sequence: event.sequence, last_hash: event.hash }),
        _ => Ok(ChainTip::genesis(epoch)),
    }
}
