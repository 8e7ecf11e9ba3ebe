use serde::{Deserialize, Serialize};

/// Severity assigned to an event at ingestion time, derived from
/// `(event_type, result)` via a fixed table (see `derive_severity`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Routine events: successful auth, ordinary data access.
    Low,
    /// Failed compliance or data-access events.
    Medium,
    /// Failed compliance or data-access events that also touch sensitive
    /// data classes, or repeated medium-severity failures.
    High,
    /// System failures and security incidents.
    Critical,
}

/// Severity of an alert raised by the integrity engine, circuit breaker, or
/// alert manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    /// Informational, no action required.
    Info,
    /// Worth noting; degraded but not broken.
    Warning,
    /// An operation failed; needs attention.
    Error,
    /// The system's integrity or availability is at risk.
    Critical,
}

/// Derive an event's severity from its type and result, per spec §4.1:
/// critical for system failures and security incidents; high/medium for
/// failed compliance or data access; low otherwise.
pub fn derive_severity(event_type: &str, result: &str) -> Severity {
    let failed = !result.eq_ignore_ascii_case("success") && !result.eq_ignore_ascii_case("ok");

    if event_type.starts_with("system.failure") || event_type.starts_with("security.incident") {
        return Severity::Critical;
    }

    if event_type.starts_with("compliance.") && failed {
        return Severity::High;
    }

    if event_type.starts_with("data.access") && failed {
        return Severity::Medium;
    }

    Severity::Low
}

/// Map an integrity-corruption level onto an alert severity. Corruption
/// level `high`/`severe` maps to `critical` per spec §4.6.
pub fn corruption_level_to_alert_severity(level: &str) -> AlertSeverity {
    match level {
        "high" | "severe" => AlertSeverity::Critical,
        "medium" => AlertSeverity::Error,
        "low" => AlertSeverity::Warning,
        _ => AlertSeverity::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_failure_is_critical() {
        assert_eq!(derive_severity("system.failure.disk", "failed"), Severity::Critical);
    }

    #[test]
    fn security_incident_is_critical() {
        assert_eq!(derive_severity("security.incident.breach", "success"), Severity::Critical);
    }

    #[test]
    fn failed_compliance_is_high() {
        assert_eq!(derive_severity("compliance.consent_check", "denied"), Severity::High);
    }

    #[test]
    fn failed_data_access_is_medium() {
        assert_eq!(derive_severity("data.access.read", "denied"), Severity::Medium);
    }

    #[test]
    fn successful_login_is_low() {
        assert_eq!(derive_severity("auth.login", "success"), Severity::Low);
    }

    #[test]
    fn corruption_mapping() {
        assert_eq!(corruption_level_to_alert_severity("severe"), AlertSeverity::Critical);
        assert_eq!(corruption_level_to_alert_severity("low"), AlertSeverity::Warning);
        assert_eq!(corruption_level_to_alert_severity("unknown"), AlertSeverity::Info);
    }
}
