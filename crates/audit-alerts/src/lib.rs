#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **audit-alerts** – Alert lifecycle: cooldown-deduplicated triggers,
//! idempotent resolution, and retention sweeping, per spec §4.6.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use audit_integrity::AlertSink;
use audit_types::alert::{Alert, NewAlert};
use audit_types::{AlertSeverity, AlertsConfig};

/// Outcome of a `trigger` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A new alert was created with this id.
    Triggered(Uuid),
    /// An alert of the same `type:severity` fired within the cooldown
    /// window; the new one was dropped, per spec §4.6.
    Deduplicated,
}

/// Outcome of a `resolve` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The alert was open and is now resolved.
    Resolved,
    /// The alert was already resolved; this call had no effect.
    AlreadyResolved,
    /// No alert with that id exists.
    NotFound,
}

/// Active-alert counts grouped by severity and by type, for dashboards.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct AlertSummary {
    /// Count of active alerts per severity.
    pub by_severity: HashMap<AlertSeverity, usize>,
    /// Count of active alerts per alert type.
    pub by_type: HashMap<String, usize>,
    /// Total active alerts.
    pub total_active: usize,
}

struct Inner {
    alerts: HashMap<Uuid, Alert>,
    cooldowns: HashMap<String, DateTime<Utc>>,
}

/// Guards the alert map and cooldown map behind a single mutex, per spec
/// §5's shared-resource policy: both are small, short-held maps, so one
/// lock is simpler than two without costing real concurrency.
pub struct AlertManager {
    inner: Mutex<Inner>,
    config: AlertsConfig,
    cooldown: chrono::Duration,
    shutdown: CancellationToken,
}

impl AlertManager {
    /// Construct an empty alert manager. Call `spawn_sweeper` to start
    /// background retention cleanup.
    pub fn new(config: AlertsConfig, alert_cooldown: std::time::Duration) -> Arc<Self> {
        let cooldown = chrono::Duration::from_std(alert_cooldown).unwrap_or_else(|_| chrono::Duration::zero());
        Arc::new(Self {
            inner: Mutex::new(Inner { alerts: HashMap::new(), cooldowns: HashMap::new() }),
            config,
            cooldown,
            shutdown: CancellationToken::new(),
        })
    }

    /// Trigger an alert, deduplicating by `cooldown_key = type:severity`.
    pub async fn trigger(&self, new: NewAlert) -> TriggerOutcome {
        let key = Alert::cooldown_key(&new.alert_type, new.severity);
        let now = Utc::now();
        let mut inner = self.inner.lock().await;

        if let Some(last) = inner.cooldowns.get(&key) {
            if now.signed_duration_since(*last) < self.cooldown {
                return TriggerOutcome::Deduplicated;
            }
        }

        let alert = Alert {
            id: Uuid::new_v4(),
            alert_type: new.alert_type,
            severity: new.severity,
            title: new.title,
            description: new.description,
            detail: new.detail,
            triggered_at: now,
            resolved_at: None,
            resolved_by: None,
        };
        let id = alert.id;
        inner.cooldowns.insert(key, now);
        inner.alerts.insert(id, alert);
        info!(alert_id = %id, "alert triggered");
        TriggerOutcome::Triggered(id)
    }

    /// Resolve an open alert. Resolving an already-resolved alert is a
    /// no-op that reports `already_resolved` rather than an error.
    pub async fn resolve(&self, id: Uuid, by: impl Into<String>) -> ResolveOutcome {
        let mut inner = self.inner.lock().await;
        match inner.alerts.get_mut(&id) {
            None => ResolveOutcome::NotFound,
            Some(alert) if !alert.is_open() => ResolveOutcome::AlreadyResolved,
            Some(alert) => {
                alert.resolved_at = Some(Utc::now());
                alert.resolved_by = Some(by.into());
                ResolveOutcome::Resolved
            }
        }
    }

    /// Snapshot of all currently-open alerts.
    pub async fn list_active(&self) -> Vec<Alert> {
        let inner = self.inner.lock().await;
        inner.alerts.values().filter(|a| a.is_open()).cloned().collect()
    }

    /// Snapshot of active-alert counts by severity and type.
    pub async fn summary(&self) -> AlertSummary {
        let inner = self.inner.lock().await;
        let mut summary = AlertSummary::default();
        for alert in inner.alerts.values().filter(|a| a.is_open()) {
            *summary.by_severity.entry(alert.severity).or_insert(0) += 1;
            *summary.by_type.entry(alert.alert_type.clone()).or_insert(0) += 1;
            summary.total_active += 1;
        }
        summary
    }

    /// Remove alerts resolved longer than `resolved_retention` ago, and
    /// cooldown entries older than the same window.
    pub async fn sweep(&self) {
        let now = Utc::now();
        let retention = chrono::Duration::from_std(self.config.resolved_retention).unwrap_or_else(|_| chrono::Duration::zero());
        let mut inner = self.inner.lock().await;

        let before = inner.alerts.len();
        inner.alerts.retain(|_, alert| match alert.resolved_at {
            Some(resolved_at) => now.signed_duration_since(resolved_at) < retention,
            None => true,
        });
        let removed_alerts = before - inner.alerts.len();

        let before = inner.cooldowns.len();
        inner.cooldowns.retain(|_, last| now.signed_duration_since(*last) < retention);
        let removed_cooldowns = before - inner.cooldowns.len();

        if removed_alerts > 0 || removed_cooldowns > 0 {
            info!(removed_alerts, removed_cooldowns, "alert sweeper ran");
        }
    }

    /// Request the sweeper task to stop on its next tick.
    pub fn begin_shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Spawn the periodic sweeper task.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.config.sweep_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => manager.sweep().await,
                    _ = manager.shutdown.cancelled() => {
                        info!("alert sweeper shutting down");
                        return;
                    }
                }
            }
        })
    }
}

#[async_trait]
impl AlertSink for AlertManager {
    async fn raise(&self, alert: NewAlert) {
        self.trigger(alert).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn alert(alert_type: &str, severity: AlertSeverity) -> NewAlert {
        NewAlert {
            alert_type: alert_type.to_string(),
            severity,
            title: "title".into(),
            description: "description".into(),
            detail: json!({}),
        }
    }

    #[tokio::test]
    async fn second_trigger_within_cooldown_is_deduplicated() {
        let manager = AlertManager::new(AlertsConfig::default(), std::time::Duration::from_secs(600));

        let first = manager.trigger(alert("sequence_integrity_issue", AlertSeverity::Warning)).await;
        assert!(matches!(first, TriggerOutcome::Triggered(_)));

        let second = manager.trigger(alert("sequence_integrity_issue", AlertSeverity::Warning)).await;
        assert_eq!(second, TriggerOutcome::Deduplicated);

        assert_eq!(manager.list_active().await.len(), 1);
    }

    #[tokio::test]
    async fn trigger_after_cooldown_elapses_creates_a_second_alert() {
        let manager = AlertManager::new(AlertsConfig::default(), std::time::Duration::from_millis(0));

        let first = manager.trigger(alert("corruption_detected", AlertSeverity::Critical)).await;
        assert!(matches!(first, TriggerOutcome::Triggered(_)));

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let second = manager.trigger(alert("corruption_detected", AlertSeverity::Critical)).await;
        assert!(matches!(second, TriggerOutcome::Triggered(_)));
        assert_eq!(manager.list_active().await.len(), 2);
    }

    #[tokio::test]
    async fn distinct_severities_do_not_share_a_cooldown_key() {
        let manager = AlertManager::new(AlertsConfig::default(), std::time::Duration::from_secs(600));

        let warning = manager.trigger(alert("hash_chain_integrity", AlertSeverity::Warning)).await;
        let critical = manager.trigger(alert("hash_chain_integrity", AlertSeverity::Critical)).await;

        assert!(matches!(warning, TriggerOutcome::Triggered(_)));
        assert!(matches!(critical, TriggerOutcome::Triggered(_)));
    }

    #[tokio::test]
    async fn resolve_is_idempotent_ish() {
        let manager = AlertManager::new(AlertsConfig::default(), std::time::Duration::from_secs(600));
        let TriggerOutcome::Triggered(id) = manager.trigger(alert("t", AlertSeverity::Info)).await else {
            panic!("expected Triggered");
        };

        assert_eq!(manager.resolve(id, "operator").await, ResolveOutcome::Resolved);
        assert_eq!(manager.resolve(id, "operator").await, ResolveOutcome::AlreadyResolved);
        assert_eq!(manager.resolve(Uuid::new_v4(), "operator").await, ResolveOutcome::NotFound);
        assert!(manager.list_active().await.is_empty());
    }

    #[tokio::test]
    async fn summary_groups_by_severity_and_type() {
        let manager = AlertManager::new(AlertsConfig::default(), std::time::Duration::from_secs(600));
        manager.trigger(alert("sequence_integrity_issue", AlertSeverity::Warning)).await;
        manager.trigger(alert("corruption_detected", AlertSeverity::Critical)).await;
        manager.trigger(alert("hash_chain_integrity", AlertSeverity::Critical)).await;

        let summary = manager.summary().await;
        assert_eq!(summary.total_active, 3);
        assert_eq!(summary.by_severity[&AlertSeverity::Critical], 2);
        assert_eq!(summary.by_severity[&AlertSeverity::Warning], 1);
        assert_eq!(summary.by_type["corruption_detected"], 1);
    }

    #[tokio::test]
    async fn sweep_removes_only_alerts_past_retention() {
        let config = AlertsConfig { resolved_retention: std::time::Duration::from_millis(0), ..Default::default() };
        let manager = AlertManager::new(config, std::time::Duration::from_secs(600));

        let TriggerOutcome::Triggered(resolved_id) = manager.trigger(alert("a", AlertSeverity::Info)).await else {
            panic!("expected Triggered");
        };
        manager.trigger(alert("b", AlertSeverity::Info)).await;
        manager.resolve(resolved_id, "operator").await;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        manager.sweep().await;

        let remaining: Vec<_> = manager.inner.lock().await.alerts.values().cloned().collect();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].alert_type, "b");
    }

    #[tokio::test]
    async fn raise_via_alert_sink_trait_triggers_an_alert() {
        let manager = AlertManager::new(AlertsConfig::default(), std::time::Duration::from_secs(600));
        let sink: &dyn AlertSink = manager.as_ref();
        sink.raise(alert("sink_test", AlertSeverity::Error)).await;
        assert_eq!(manager.list_active().await.len(), 1);
    }
}
