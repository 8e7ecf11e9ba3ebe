use thiserror::Error;
use uuid::Uuid;

/// The capacity point that was exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityKind {
    /// The bounded ingestion queue is full.
    QueueFull,
    /// A subscriber connection's outgoing mailbox is full.
    MailboxFull,
    /// A subscriber's token bucket has no tokens available.
    RateLimited,
    /// The streamer has reached `max_connections`.
    MaxConnections,
}

/// Error taxonomy shared across the pipeline, per spec §7.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Caller supplied bad input; reject, never retry.
    #[error("validation failed: {0}")]
    Validation(String),
    /// Network/timeout talking to the store; retried by the circuit
    /// breaker, surfaced after the breaker opens.
    #[error("transient store error: {0}")]
    TransientStore(String),
    /// Hash mismatch or sequence gap; raises an alert, never retried
    /// silently.
    #[error("integrity violation: {0}")]
    IntegrityViolation(String),
    /// Queue full, mailbox full; degraded or rejected per policy.
    #[error("capacity exhausted: {0:?}")]
    Capacity(CapacityKind),
    /// Call made during startup/shutdown.
    #[error("lifecycle error: {0}")]
    Lifecycle(String),
    /// Operation was cancelled before completion.
    #[error("cancelled")]
    Cancelled,
}

/// The only outcomes `log_event` may return to a caller, per spec §7's
/// "user-visible behavior": `ok`, `validation_failed`, or
/// `capacity_exhausted` (the latter only with degradation disabled).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutcome {
    /// The event was admitted to the ingestion queue (or deliberately
    /// dropped under graceful degradation, which is still `ok` to the
    /// caller).
    Ok {
        /// The id assigned to the admitted event.
        event_id: Uuid,
    },
    /// The event failed validation and was not admitted.
    ValidationFailed(String),
    /// The queue was full and graceful degradation is disabled.
    CapacityExhausted,
    /// The ingestor is draining its queue ahead of shutdown and is no
    /// longer accepting new events. Distinct from `CapacityExhausted`:
    /// this is a lifecycle state, not a load condition.
    ShuttingDown,
}

impl LogOutcome {
    /// Whether the caller should treat this as success.
    pub fn is_ok(&self) -> bool {
        matches!(self, LogOutcome::Ok { .. })
    }
}
