#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **audit-types** – Shared primitive data structures for the Toka audit
//! subsystem.
//!
//! This crate sits at the bottom of the audit crate graph: it defines the
//! event model, severities, filters, alerts, configuration, and the error
//! taxonomy shared by every other `audit-*` crate. It makes no assumptions
//! about storage, hashing, or transport.

/// Event model: unsealed/sealed events, actor/target refs, timestamps.
pub mod event;
/// Severity classification for events and alerts.
pub mod severity;
/// Subscriber filter predicates.
pub mod filter;
/// Alert lifecycle types.
pub mod alert;
/// Configuration structs mirroring the complete option enumeration.
pub mod config;
/// Error taxonomy shared across the pipeline.
pub mod error;
/// Lock-free metrics counters.
pub mod metrics;
/// Chain-tip state shared by the sealer and readers.
pub mod chain;

pub use event::{Actor, EventTimestamp, SealedEvent, TargetRef, UnsealedEvent};
pub use severity::{AlertSeverity, Severity};
pub use filter::Filter;
pub use alert::Alert;
pub use config::{AlertsConfig, IntegrityConfig, LoggerConfig, StreamerConfig};
pub use error::{AuditError, CapacityKind, LogOutcome};
pub use metrics::{EventMetrics, MetricsSnapshot};
pub use chain::{ChainEpoch, ChainTip};

/// Drop policy applied by the ingestor when the bounded queue is saturated
/// and graceful degradation is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DropPolicy {
    /// Drop the oldest queued event to make room for the new one.
    Oldest,
    /// Drop the incoming event, keeping the queue as-is.
    Newest,
    /// Drop a uniformly-random queued event.
    Random,
}
