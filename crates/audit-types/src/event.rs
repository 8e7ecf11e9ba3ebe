use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use uuid::Uuid;

use crate::severity::Severity;

/// Identifier for a sealed event (UUID v4, assigned by the ingestor, not
/// the sealer — the sealer only assigns sequence + hash).
pub type EventId = Uuid;

/// Monotonic, contiguous sequence number assigned by the sealer. Starts at 1.
pub type Sequence = u64;

/// Actor identity attached to an event: who did it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Opaque actor identifier (user id, service account, etc).
    pub id: String,
    /// Client network address, honoring `X-Forwarded-For`/`X-Real-IP` when
    /// enrichment is enabled.
    pub address: Option<String>,
    /// User agent string, if available.
    pub agent: Option<String>,
    /// Session identifier, if available.
    pub session: Option<String>,
    /// Correlation id linking this event to a wider request trace.
    pub correlation_id: Option<String>,
}

impl Actor {
    /// Construct an actor with only the required `id` populated.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: None,
            agent: None,
            session: None,
            correlation_id: None,
        }
    }
}

/// Target identity an action was performed against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRef {
    /// Opaque target identifier (resource id, record id, entity id).
    pub id: String,
}

impl TargetRef {
    /// Construct a target reference.
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// High-resolution timestamp: wall clock plus a monotonic nanosecond
/// counter used to break ties and detect clock skew within a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventTimestamp {
    /// Wall-clock time the event was created.
    pub wall: DateTime<Utc>,
    /// Monotonic nanosecond counter, process-local, used only to order
    /// events created within the same wall-clock instant.
    pub monotonic_nanos: u64,
}

impl EventTimestamp {
    /// Capture the current wall-clock time paired with a monotonic reading.
    pub fn now(monotonic: &std::time::Instant) -> Self {
        Self {
            wall: Utc::now(),
            monotonic_nanos: monotonic.elapsed().as_nanos() as u64,
        }
    }
}

/// An event before it has been admitted to the hash chain. No `sequence`,
/// `hash`, or `previous_hash` exist yet — per spec §3, "No event is visible
/// to queries until it has a sequence and hash," so this type is simply
/// incapable of being queried: it carries no sequence/hash fields at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsealedEvent {
    /// Opaque event identifier, assigned at ingestion time.
    pub id: EventId,
    /// Event type/classification tag, e.g. `auth.login`, `data.access.read`.
    pub event_type: String,
    /// Severity derived from `(event_type, result)`.
    pub severity: Severity,
    /// Who performed the action.
    pub actor: Actor,
    /// What the action was performed against.
    pub target: TargetRef,
    /// The verb describing what happened, e.g. `read`, `grant`, `revoke`.
    pub action: String,
    /// Outcome string, e.g. `success`, `denied`, `error`.
    pub result: String,
    /// When the event occurred.
    pub timestamp: EventTimestamp,
    /// Data-class tags for compliance reporting, e.g. `pii`, `financial`.
    pub data_classes: SmallVec<[String; 4]>,
    /// Legal basis string for compliance (e.g. `consent`, `contract`).
    pub legal_basis: Option<String>,
    /// Compliance-relevant attribute map (sorted for deterministic hashing).
    pub compliance_attributes: BTreeMap<String, String>,
    /// Free-form attribute map supplied by the caller.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl UnsealedEvent {
    /// Validate the minimal invariants the ingestor must enforce before
    /// admission: identifier present (always true by construction) and
    /// actor non-empty.
    pub fn validate(&self) -> Result<(), String> {
        if self.actor.id.trim().is_empty() {
            return Err("actor id must not be empty".to_string());
        }
        if self.event_type.trim().is_empty() {
            return Err("event type must not be empty".to_string());
        }
        Ok(())
    }
}

/// An event after sealing: immutable, carries its position in the hash
/// chain. Only the sealer (`audit-chain`) constructs these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealedEvent {
    /// The original unsealed event fields, flattened.
    #[serde(flatten)]
    pub event: UnsealedEventSnapshot,
    /// Chain epoch this event belongs to (see `ChainEpoch`).
    pub epoch: u32,
    /// Monotonic, contiguous sequence number within the epoch.
    pub sequence: Sequence,
    /// Hex-encoded hash of this event, linking it to its successor.
    pub hash: String,
    /// Hex-encoded hash of the previous event (empty string at sequence 1).
    pub previous_hash: String,
}

/// A `Clone`+`PartialEq`-friendly snapshot of `UnsealedEvent`'s fields,
/// used inline inside `SealedEvent` so sealing never has to re-derive
/// severity or re-validate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsealedEventSnapshot {
    /// See `UnsealedEvent::id`.
    pub id: EventId,
    /// See `UnsealedEvent::event_type`.
    pub event_type: String,
    /// See `UnsealedEvent::severity`.
    pub severity: Severity,
    /// See `UnsealedEvent::actor`.
    pub actor: Actor,
    /// See `UnsealedEvent::target`.
    pub target: TargetRef,
    /// See `UnsealedEvent::action`.
    pub action: String,
    /// See `UnsealedEvent::result`.
    pub result: String,
    /// See `UnsealedEvent::timestamp`.
    pub timestamp: EventTimestamp,
    /// See `UnsealedEvent::data_classes`.
    pub data_classes: SmallVec<[String; 4]>,
    /// See `UnsealedEvent::legal_basis`.
    pub legal_basis: Option<String>,
    /// See `UnsealedEvent::compliance_attributes`.
    pub compliance_attributes: BTreeMap<String, String>,
    /// See `UnsealedEvent::attributes`.
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl From<UnsealedEvent> for UnsealedEventSnapshot {
    fn from(e: UnsealedEvent) -> Self {
        Self {
            id: e.id,
            event_type: e.event_type,
            severity: e.severity,
            actor: e.actor,
            target: e.target,
            action: e.action,
            result: e.result,
            timestamp: e.timestamp,
            data_classes: e.data_classes,
            legal_basis: e.legal_basis,
            compliance_attributes: e.compliance_attributes,
            attributes: e.attributes,
        }
    }
}

impl SealedEvent {
    /// Convenience accessor mirroring `UnsealedEvent::id`.
    pub fn id(&self) -> EventId {
        self.event.id
    }
}
