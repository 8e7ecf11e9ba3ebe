use serde::Serialize;

use audit_alerts::AlertSummary;
use audit_breaker::BreakerState;
use audit_types::{ChainTip, MetricsSnapshot};

/// A point-in-time snapshot of the whole pipeline's health, combining the
/// metrics counters, chain tip, circuit breaker state, queue depth, active
/// subscriber count, and open-alert summary. This is what a health/status
/// endpoint built on top of `audit-core` would serialize.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// Ingestion/batch/streamer counters since process start.
    pub metrics: MetricsSnapshot,
    /// Current chain tip.
    pub chain_tip: ChainTip,
    /// Circuit breaker state, as a lowercase label (`closed`/`open`/`half_open`).
    pub breaker_state: &'static str,
    /// Current depth of the admission queue.
    pub queue_depth: usize,
    /// Number of active subscriber connections.
    pub active_connections: usize,
    /// Count of active alerts by severity and by type.
    pub alerts: AlertSummary,
}

pub(crate) fn breaker_state_label(state: BreakerState) -> &'static str {
    match state {
        BreakerState::Closed => "closed",
        BreakerState::Open => "open",
        BreakerState::HalfOpen => "half_open",
    }
}
