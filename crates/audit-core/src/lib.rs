#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **audit-core** – Top-level facade for the Toka audit subsystem.
//!
//! Wires `audit-ingest`, `audit-batch` (and its internal `audit-chain`
//! sealer and `audit-breaker` circuit breaker), `audit-integrity`,
//! `audit-alerts`, and `audit-streamer` into one running pipeline, and
//! owns configuration loading and status reporting. A caller outside this
//! workspace only ever needs `AuditConfig::load`, `AuditPipeline::start`,
//! `AuditPipeline::log_event`, `AuditPipeline::status`, and
//! `AuditPipeline::shutdown`.

/// Configuration loading: environment + optional TOML file via the
/// `config` crate, with `dotenv` support for local development.
pub mod config;
/// The pipeline facade: startup wiring and graceful shutdown.
pub mod pipeline;
/// The point-in-time health snapshot type.
pub mod status;

pub use config::{AuditConfig, ConfigError};
pub use pipeline::{AuditPipeline, ShutdownReport};
pub use status::StatusSnapshot;
