#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **audit-integrity** – Periodic and on-demand chain, sequence, and
//! corruption verification, per spec §4.5. Reads exclusively through the
//! store; never touches the in-flight ingestion/batch pipeline.

/// Per-epoch sealer lookup for verification.
pub mod keyring;
/// Structured report types returned by every engine operation.
pub mod report;
/// The verification engine itself: `verify_chain`, `verify_sequence`,
/// `detect_corruption`, `repair_chain`.
pub mod engine;
/// Recurring-check scheduler plus the `AlertSink` contract it notifies.
pub mod scheduler;

pub use engine::{CorruptionCriteria, IntegrityEngine, RepairOptions};
pub use keyring::EpochKeyring;
pub use report::{ChainReport, CorruptionLevel, CorruptionReport, RepairOutcome, SequenceReport};
pub use scheduler::{AlertSink, CheckType, IntegrityScheduler};
