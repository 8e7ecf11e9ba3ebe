use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::severity::AlertSeverity;

/// A raised alert. Lifecycle: triggered (subject to cooldown), retained
/// while open, garbage-collected some configurable period after resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert id.
    pub id: Uuid,
    /// Alert type tag, e.g. `sequence_integrity_issue`, `corruption_detected`.
    pub alert_type: String,
    /// Severity of the alert.
    pub severity: AlertSeverity,
    /// Human-readable title.
    pub title: String,
    /// Human-readable description.
    pub description: String,
    /// Arbitrary structured detail payload.
    pub detail: serde_json::Value,
    /// When the alert was triggered.
    pub triggered_at: DateTime<Utc>,
    /// When the alert was resolved, if it has been.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Who resolved the alert, if it has been.
    pub resolved_by: Option<String>,
}

impl Alert {
    /// The `type:severity` key used by the alert manager to deduplicate
    /// triggers within a cooldown window.
    pub fn cooldown_key(alert_type: &str, severity: AlertSeverity) -> String {
        format!("{alert_type}:{severity:?}")
    }

    /// This alert's own cooldown key.
    pub fn this_cooldown_key(&self) -> String {
        Self::cooldown_key(&self.alert_type, self.severity)
    }

    /// Whether the alert is still open (not yet resolved).
    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}

/// Construction parameters for a new alert, before an id/timestamp is
/// assigned by the alert manager.
#[derive(Debug, Clone)]
pub struct NewAlert {
    /// See `Alert::alert_type`.
    pub alert_type: String,
    /// See `Alert::severity`.
    pub severity: AlertSeverity,
    /// See `Alert::title`.
    pub title: String,
    /// See `Alert::description`.
    pub description: String,
    /// See `Alert::detail`.
    pub detail: serde_json::Value,
}
