use serde::{Deserialize, Serialize};

use audit_types::config::HashSecretKey;
use audit_types::{AlertsConfig, IntegrityConfig, LoggerConfig, StreamerConfig};

/// The complete configuration for one audit pipeline instance: the four
/// option blocks spec §6 enumerates (`Logger`, `Integrity`, `Streamer`,
/// plus the alert-sweeper block `audit-alerts` needs) and the chain epoch
/// to seal into.
///
/// Loaded from an optional TOML file plus environment overrides prefixed
/// `AUDIT__`, with nested keys separated by `__` (e.g.
/// `AUDIT__LOGGER__BATCH_SIZE=512`), via the `config` crate — mirroring
/// the donor workspace's `config = "0.14"` + `dotenv = "0.15"` pairing in
/// its service binaries (`toka-orchestration-service`'s `dotenv::dotenv()
/// .ok()` call before parsing its own CLI config).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Ingestion + batching configuration.
    pub logger: LoggerConfig,
    /// Integrity engine + scheduler configuration.
    pub integrity: IntegrityConfig,
    /// Streamer configuration.
    pub streamer: StreamerConfig,
    /// Alert manager sweeper configuration.
    pub alerts: AlertsConfig,
    /// Chain epoch this instance seals into. Incremented whenever the
    /// hash secret key is rotated (spec §9 Open Question #2).
    pub epoch: u32,
    /// How long `shutdown` waits for the queue to drain before giving up
    /// and reporting unflushed events (spec §4.8).
    #[serde(with = "duration_millis")]
    pub shutdown_timeout: std::time::Duration,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            integrity: IntegrityConfig::default(),
            streamer: StreamerConfig::default(),
            alerts: AlertsConfig::default(),
            epoch: 0,
            shutdown_timeout: std::time::Duration::from_secs(10),
        }
    }
}

/// Error returned by `AuditConfig::load`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The `config` crate failed to merge/parse sources.
    #[error("failed to load configuration: {0}")]
    Source(#[from] config::ConfigError),
    /// `AUDIT_HASH_SECRET_KEY` was missing or shorter than
    /// `HashSecretKey::MIN_LEN`.
    #[error("AUDIT_HASH_SECRET_KEY must be set to at least {} bytes", HashSecretKey::MIN_LEN)]
    MissingOrShortKey,
}

impl AuditConfig {
    /// Load configuration from an optional TOML file plus environment
    /// overrides. Calls `dotenv().ok()` first so a local `.env` file can
    /// supply `AUDIT_HASH_SECRET_KEY` and friends in development, exactly
    /// as the donor's service binaries do before touching their own
    /// config layer.
    pub fn load(toml_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = toml_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let source = builder
            .add_source(config::Environment::with_prefix("AUDIT").separator("__"))
            .build()?;

        source.try_deserialize().map_err(ConfigError::Source)
    }

    /// Read `AUDIT_HASH_SECRET_KEY` from the environment (raw bytes, taken
    /// as the UTF-8 value of the variable). Kept separate from
    /// `try_deserialize` because `HashSecretKey` intentionally has no
    /// `Deserialize` impl that accepts short keys silently — loading it is
    /// a distinct, validated step.
    pub fn load_secret_key() -> Result<HashSecretKey, ConfigError> {
        let raw = std::env::var("AUDIT_HASH_SECRET_KEY").map_err(|_| ConfigError::MissingOrShortKey)?;
        if raw.len() < HashSecretKey::MIN_LEN {
            return Err(ConfigError::MissingOrShortKey);
        }
        Ok(HashSecretKey::from_bytes(raw.into_bytes()))
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
    fn defaults_are_internally_consistent() {
        let cfg = AuditConfig::default();
        assert!(cfg.logger.buffer_size > 0);
        assert!(cfg.integrity.integrity_score_threshold > 0.0);
    }

    #[test]
    fn missing_secret_key_env_var_is_rejected() {
        std::env::remove_var("AUDIT_HASH_SECRET_KEY");
        assert!(matches!(AuditConfig::load_secret_key(), Err(ConfigError::MissingOrShortKey)));
    }

    #[test]
    fn short_secret_key_env_var_is_rejected() {
        std::env::set_var("AUDIT_HASH_SECRET_KEY", "too-short");
        let result = AuditConfig::load_secret_key();
        std::env::remove_var("AUDIT_HASH_SECRET_KEY");
        assert!(matches!(result, Err(ConfigError::MissingOrShortKey)));
    }

    #[test]
    fn sufficiently_long_secret_key_env_var_is_accepted() {
        std::env::set_var("AUDIT_HASH_SECRET_KEY", "x".repeat(32));
        let key = AuditConfig::load_secret_key().unwrap();
        std::env::remove_var("AUDIT_HASH_SECRET_KEY");
        assert_eq!(key.len(), 32);
    }
}
