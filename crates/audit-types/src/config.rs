use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::DropPolicy;

/// Secret key material used to MAC the hash chain. Debug-redacted so it
/// never leaks into logs.
#[derive(Clone, Serialize, Deserialize)]
pub struct HashSecretKey(Vec<u8>);

impl HashSecretKey {
    /// Minimum accepted key length per spec §4.3.
    pub const MIN_LEN: usize = 32;

    /// Wrap raw key bytes. Does not validate length — use
    /// `audit_chain::Sealer::new`, which refuses to start with a short key.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Borrow the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Length of the key in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the key is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for HashSecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("HashSecretKey").field(&"<redacted>").finish()
    }
}

/// Logger (ingestion + batching) configuration. Mirrors spec §6's "Logger"
/// option block verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Number of batch worker tasks.
    pub worker_pool_size: usize,
    /// Number of concurrent batch workers draining the dispatch queue.
    pub batch_workers: usize,
    /// Maximum events per batch before it is sealed.
    pub batch_size: usize,
    /// Maximum time a partially-filled batch waits before sealing.
    #[serde(with = "duration_millis")]
    pub batch_timeout: Duration,
    /// Capacity of the bounded ingestion queue.
    pub buffer_size: usize,
    /// Timeout for a single store write.
    #[serde(with = "duration_millis")]
    pub write_timeout: Duration,
    /// Whether hash-chain sealing is enabled (disabling it is only valid
    /// for local/dev use; production always seals).
    pub hash_chain_enabled: bool,
    /// MAC key used by the sealer. `None` until provisioned.
    pub hash_secret_key: Option<HashSecretKey>,
    /// Consecutive store-write failures before the circuit breaker opens.
    pub failure_threshold: u32,
    /// How long the circuit breaker stays open before probing.
    #[serde(with = "duration_millis")]
    pub circuit_timeout: Duration,
    /// Whether request-context enrichment is attempted.
    pub enrichment_enabled: bool,
    /// Whether the ingestor sheds load instead of rejecting on a full queue.
    pub graceful_degradation: bool,
    /// Soft memory budget for the in-flight queue, in bytes.
    pub max_memory_usage: usize,
    /// Drop policy applied under graceful degradation.
    pub drop_policy: DropPolicy,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 4,
            batch_workers: 4,
            batch_size: 256,
            batch_timeout: Duration::from_millis(100),
            buffer_size: 10_000,
            write_timeout: Duration::from_secs(2),
            hash_chain_enabled: true,
            hash_secret_key: None,
            failure_threshold: 5,
            circuit_timeout: Duration::from_secs(30),
            enrichment_enabled: true,
            graceful_degradation: true,
            max_memory_usage: 256 * 1024 * 1024,
            drop_policy: DropPolicy::Oldest,
        }
    }
}

/// Integrity engine + scheduler configuration. Mirrors spec §6's
/// "Integrity" option block verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    /// Interval between incremental hash-chain checks.
    #[serde(with = "duration_millis")]
    pub hash_chain_check_interval: Duration,
    /// Interval between sequence-gap/duplicate checks.
    #[serde(with = "duration_millis")]
    pub sequence_check_interval: Duration,
    /// Interval between corruption scans.
    #[serde(with = "duration_millis")]
    pub corruption_scan_interval: Duration,
    /// Interval between comprehensive (rolling-window) checks.
    #[serde(with = "duration_millis")]
    pub comprehensive_check_interval: Duration,
    /// Maximum number of checks the scheduler runs concurrently.
    pub max_concurrent_checks: usize,
    /// Per-check timeout; overruns are cancelled and logged.
    #[serde(with = "duration_millis")]
    pub check_timeout: Duration,
    /// Number of most-recent sequences an incremental check covers.
    pub incremental_check_size: u64,
    /// Sequence-range size above which a check is considered "full" rather
    /// than incremental.
    pub full_check_threshold: u64,
    /// Whether `repair_chain` is permitted to run.
    pub chain_repair_enabled: bool,
    /// Integrity score below which an alert is raised.
    pub integrity_score_threshold: f64,
    /// Corruption-ratio threshold above which an alert is raised.
    pub corruption_threshold: f64,
    /// Cooldown window for deduplicating alerts of the same type+severity.
    #[serde(with = "duration_millis")]
    pub alert_cooldown: Duration,
    /// Whether the scheduler dispatches background checks at all.
    pub enable_background_checks: bool,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            hash_chain_check_interval: Duration::from_secs(60),
            sequence_check_interval: Duration::from_secs(30),
            corruption_scan_interval: Duration::from_secs(300),
            comprehensive_check_interval: Duration::from_secs(86_400),
            max_concurrent_checks: 2,
            check_timeout: Duration::from_secs(30),
            incremental_check_size: 1_000,
            full_check_threshold: 100_000,
            chain_repair_enabled: false,
            integrity_score_threshold: 0.999,
            corruption_threshold: 0.01,
            alert_cooldown: Duration::from_secs(600),
            enable_background_checks: true,
        }
    }
}

/// Streamer configuration. Mirrors spec §6's "Streamer" option block
/// verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    /// Maximum number of concurrent subscriber connections.
    pub max_connections: usize,
    /// Capacity of the internal publisher→dispatcher event buffer.
    pub event_buffer_size: usize,
    /// Number of events the dispatcher drains per tick.
    pub batch_size: usize,
    /// How often the dispatcher flushes partial progress.
    #[serde(with = "duration_millis")]
    pub flush_interval: Duration,
    /// Idle duration after which a connection is pruned.
    #[serde(with = "duration_millis")]
    pub idle_ttl: Duration,
    /// Sustained token-bucket refill rate per connection.
    pub rate_limit_per_second: f64,
    /// Token-bucket burst capacity per connection.
    pub rate_limit_burst: u64,
    /// Whether filter evaluation is applied at all (disabling broadcasts
    /// every event to every connection).
    pub enable_event_filtering: bool,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            max_connections: 1_000,
            event_buffer_size: 10_000,
            batch_size: 64,
            flush_interval: Duration::from_millis(50),
            idle_ttl: Duration::from_secs(300),
            rate_limit_per_second: 50.0,
            rate_limit_burst: 100,
            enable_event_filtering: true,
        }
    }
}

/// Alert manager configuration. Not named in spec §6's option listing
/// (which only pins down `alert_cooldown`, kept on `IntegrityConfig` since
/// every threshold alert flows through there); this block supplements it
/// with the sweeper timing spec §4.6 requires but leaves unconfigured.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    /// How long a resolved alert is retained before the sweeper removes it.
    #[serde(with = "duration_millis")]
    pub resolved_retention: Duration,
    /// How often the sweeper runs.
    #[serde(with = "duration_millis")]
    pub sweep_interval: Duration,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self { resolved_retention: Duration::from_secs(7 * 24 * 3600), sweep_interval: Duration::from_secs(60) }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(d)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_round_trip_through_json() {
        let cfg = LoggerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: LoggerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.batch_size, cfg.batch_size);
    }

    #[test]
    fn secret_key_debug_is_redacted() {
        let key = HashSecretKey::from_bytes(vec![1u8; 32]);
        assert_eq!(format!("{key:?}"), "HashSecretKey(\"<redacted>\")");
    }
}
