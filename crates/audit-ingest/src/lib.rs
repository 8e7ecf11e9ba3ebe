#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **audit-ingest** – The synchronous admission path for audit events, per
//! spec §4.1: build the event, enrich it from request context, validate it,
//! and admit it to a bounded, non-blocking queue the batch coordinator
//! later drains.
//!
//! Grounded on `toka-bus-core::InMemoryBus`'s broadcast-channel admission
//! pattern, generalized to the drop-policy semantics spec §4.1 requires.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};
use uuid::Uuid;

use audit_types::error::LogOutcome;
use audit_types::event::{Actor, EventTimestamp, TargetRef, UnsealedEvent};
use audit_types::severity::derive_severity;
use audit_types::{EventMetrics, LoggerConfig};

/// Request-context carrier plus header-derived enrichment.
pub mod context;
/// The bounded, drop-policy-aware admission queue.
pub mod queue;

pub use context::RequestContext;
pub use queue::{AdmitOutcome, IngestQueue};

/// The fields a caller supplies to describe one audit-worthy occurrence.
/// Everything the ingestor itself derives (id, timestamp, severity) is
/// intentionally absent here.
#[derive(Debug, Clone)]
pub struct EventDraft {
    /// Event type/classification tag, e.g. `auth.login`.
    pub event_type: String,
    /// Who performed the action (id required; enrichment fills the rest).
    pub actor: Actor,
    /// What the action was performed against.
    pub target: TargetRef,
    /// The verb describing what happened.
    pub action: String,
    /// Outcome string, e.g. `success`, `denied`, `error`.
    pub result: String,
    /// Data-class tags for compliance reporting.
    pub data_classes: smallvec::SmallVec<[String; 4]>,
    /// Legal basis string for compliance.
    pub legal_basis: Option<String>,
    /// Compliance-relevant attribute map.
    pub compliance_attributes: std::collections::BTreeMap<String, String>,
    /// Free-form attribute map supplied by the caller.
    pub attributes: std::collections::BTreeMap<String, serde_json::Value>,
}

/// The event ingestor: owns the bounded admission queue and the
/// ingestion-half of `LoggerConfig`. The batch coordinator owns draining.
pub struct Ingestor {
    queue: Arc<IngestQueue>,
    config: LoggerConfig,
    metrics: Arc<EventMetrics>,
    shutting_down: AtomicBool,
    epoch: Instant,
}

impl Ingestor {
    /// Construct an ingestor with the given configuration and a shared
    /// metrics handle (shared with the batch coordinator and streamer so
    /// all counters land in one place).
    pub fn new(config: LoggerConfig, metrics: Arc<EventMetrics>) -> Self {
        let queue = Arc::new(IngestQueue::new(config.buffer_size));
        Self {
            queue,
            config,
            metrics,
            shutting_down: AtomicBool::new(false),
            epoch: Instant::now(),
        }
    }

    /// Handle to the admission queue, for the batch coordinator to drain.
    pub fn queue(&self) -> Arc<IngestQueue> {
        Arc::clone(&self.queue)
    }

    /// Begin graceful shutdown: `log_event` starts returning
    /// `LogOutcome::ShuttingDown` immediately, but anything already queued
    /// is left for the batch coordinator to drain and seal per spec §4.8.
    pub fn begin_shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    /// Whether the ingestor is in its shutdown window.
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Admit one event. This is the entire synchronous contract of
    /// `log_event` from spec §4.1: assemble, enrich, validate, enqueue.
    ///
    /// A cancelled `ctx.cancellation` token is not consulted here — once
    /// this call returns `Ok`, the event is durably queued regardless of
    /// what happens to the caller's request afterward (spec §5).
    pub async fn log_event(&self, draft: EventDraft, ctx: &RequestContext) -> LogOutcome {
        if self.is_shutting_down() {
            return LogOutcome::ShuttingDown;
        }

        let mut actor = draft.actor;
        if self.config.enrichment_enabled {
            let enrichment = context::enrich(ctx);
            actor.address = enrichment.address;
            actor.agent = enrichment.agent;
            actor.session = ctx.session.clone();
            actor.correlation_id = ctx.correlation_id.clone();
        }

        let severity = derive_severity(&draft.event_type, &draft.result);
        let event = UnsealedEvent {
            id: Uuid::new_v4(),
            event_type: draft.event_type,
            severity,
            actor,
            target: draft.target,
            action: draft.action,
            result: draft.result,
            timestamp: EventTimestamp::now(&self.epoch),
            data_classes: draft.data_classes,
            legal_basis: draft.legal_basis,
            compliance_attributes: draft.compliance_attributes,
            attributes: draft.attributes,
        };

        if let Err(reason) = event.validate() {
            return LogOutcome::ValidationFailed(reason);
        }

        let event_id = event.id;
        let outcome = self
            .queue
            .push(event, self.config.drop_policy, self.config.graceful_degradation)
            .await;

        match outcome {
            AdmitOutcome::Admitted => {
                self.metrics.record_ingested();
                debug!(%event_id, "event admitted");
                LogOutcome::Ok { event_id }
            }
            AdmitOutcome::AdmittedWithDrop(_dropped) => {
                self.metrics.record_ingested();
                self.metrics.record_dropped(1);
                warn!(%event_id, policy = ?self.config.drop_policy, "queue saturated, applied drop policy");
                LogOutcome::Ok { event_id }
            }
            AdmitOutcome::Rejected => {
                warn!("queue saturated and graceful degradation disabled, rejecting");
                LogOutcome::CapacityExhausted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_types::DropPolicy;
    use std::collections::BTreeMap;

    fn draft(actor: &str) -> EventDraft {
        EventDraft {
            event_type: "auth.login".into(),
            actor: Actor::new(actor),
            target: TargetRef::new("session-1"),
            action: "login".into(),
            result: "success".into(),
            data_classes: Default::default(),
            legal_basis: None,
            compliance_attributes: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn admits_valid_event() {
        let ingestor = Ingestor::new(LoggerConfig::default(), Arc::new(EventMetrics::new()));
        let outcome = ingestor.log_event(draft("user-1"), &RequestContext::empty()).await;
        assert!(outcome.is_ok());
        assert_eq!(ingestor.queue().len().await, 1);
    }

    #[tokio::test]
    async fn rejects_event_with_empty_actor() {
        let ingestor = Ingestor::new(LoggerConfig::default(), Arc::new(EventMetrics::new()));
        let outcome = ingestor.log_event(draft(""), &RequestContext::empty()).await;
        assert!(matches!(outcome, LogOutcome::ValidationFailed(_)));
        assert_eq!(ingestor.queue().len().await, 0);
    }

    #[tokio::test]
    async fn enrichment_populates_actor_from_headers() {
        let mut cfg = LoggerConfig::default();
        cfg.enrichment_enabled = true;
        let ingestor = Ingestor::new(cfg, Arc::new(EventMetrics::new()));

        let mut ctx = RequestContext::empty();
        ctx.headers.insert("x-forwarded-for".into(), "203.0.113.7".into());
        ctx.headers.insert("user-agent".into(), "curl/8.0".into());
        ctx.session = Some("sess-42".into());

        ingestor.log_event(draft("user-1"), &ctx).await;
        let queued = ingestor.queue().drain(1).await;
        assert_eq!(queued[0].actor.address.as_deref(), Some("203.0.113.7"));
        assert_eq!(queued[0].actor.agent.as_deref(), Some("curl/8.0"));
        assert_eq!(queued[0].actor.session.as_deref(), Some("sess-42"));
    }

    #[tokio::test]
    async fn disabled_enrichment_leaves_actor_untouched() {
        let mut cfg = LoggerConfig::default();
        cfg.enrichment_enabled = false;
        let ingestor = Ingestor::new(cfg, Arc::new(EventMetrics::new()));

        let mut ctx = RequestContext::empty();
        ctx.headers.insert("x-forwarded-for".into(), "203.0.113.7".into());

        ingestor.log_event(draft("user-1"), &ctx).await;
        let queued = ingestor.queue().drain(1).await;
        assert_eq!(queued[0].actor.address, None);
    }

    #[tokio::test]
    async fn capacity_exhausted_when_degradation_disabled() {
        let mut cfg = LoggerConfig::default();
        cfg.buffer_size = 1;
        cfg.graceful_degradation = false;
        let ingestor = Ingestor::new(cfg, Arc::new(EventMetrics::new()));

        ingestor.log_event(draft("a"), &RequestContext::empty()).await;
        let second = ingestor.log_event(draft("b"), &RequestContext::empty()).await;
        assert_eq!(second, LogOutcome::CapacityExhausted);
    }

    #[tokio::test]
    async fn drop_policy_applies_under_saturation() {
        let mut cfg = LoggerConfig::default();
        cfg.buffer_size = 1;
        cfg.graceful_degradation = true;
        cfg.drop_policy = DropPolicy::Oldest;
        let ingestor = Ingestor::new(cfg, Arc::new(EventMetrics::new()));

        ingestor.log_event(draft("a"), &RequestContext::empty()).await;
        let second = ingestor.log_event(draft("b"), &RequestContext::empty()).await;
        assert!(second.is_ok());
        let queued = ingestor.queue().drain(10).await;
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].actor.id, "b");
    }

    #[tokio::test]
    async fn shutdown_rejects_new_events_but_keeps_queued_ones() {
        let ingestor = Ingestor::new(LoggerConfig::default(), Arc::new(EventMetrics::new()));
        ingestor.log_event(draft("a"), &RequestContext::empty()).await;
        ingestor.begin_shutdown();
        let outcome = ingestor.log_event(draft("b"), &RequestContext::empty()).await;
        assert_eq!(outcome, LogOutcome::ShuttingDown);
        assert_eq!(ingestor.queue().len().await, 1);
    }

    #[tokio::test]
    async fn cancelled_context_does_not_retract_an_already_admitted_event() {
        let ingestor = Ingestor::new(LoggerConfig::default(), Arc::new(EventMetrics::new()));
        let token = tokio_util::sync::CancellationToken::new();
        let mut ctx = RequestContext::empty();
        ctx.cancellation = Some(token.clone());

        let outcome = ingestor.log_event(draft("a"), &ctx).await;
        token.cancel();

        assert!(outcome.is_ok());
        assert_eq!(ingestor.queue().len().await, 1);
    }
}
