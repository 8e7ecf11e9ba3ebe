use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use audit_types::Severity;

/// Sort order for `Store::query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Ascending by sequence number.
    #[default]
    Ascending,
    /// Descending by sequence number.
    Descending,
}

/// Filtered-query criteria, per spec §6: event type set, actor set, target
/// set, time range, severity set, data-class set, compliance-attribute map,
/// and sequence range, with sort and pagination.
#[derive(Debug, Clone, Default)]
pub struct QueryCriteria {
    /// Restrict to these event types, if set.
    pub event_types: Option<HashSet<String>>,
    /// Restrict to these actor ids, if set.
    pub actors: Option<HashSet<String>>,
    /// Restrict to these target ids, if set.
    pub targets: Option<HashSet<String>>,
    /// Restrict to this inclusive time range, if set.
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Restrict to these severities, if set.
    pub severities: Option<HashSet<Severity>>,
    /// Restrict to events carrying at least one of these data classes.
    pub data_classes: Option<HashSet<String>>,
    /// Restrict to events whose compliance attributes match every entry.
    pub compliance_attributes: Option<BTreeMap<String, String>>,
    /// Restrict to this inclusive sequence range, if set.
    pub sequence_range: Option<(u64, u64)>,
    /// Result ordering.
    pub sort: SortOrder,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Number of leading results to skip, applied after sort.
    pub offset: Option<usize>,
}

impl QueryCriteria {
    /// An unrestricted criteria set matching every event.
    pub fn all() -> Self {
        Self::default()
    }

    pub(crate) fn matches(&self, event: &audit_types::SealedEvent) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.contains(&event.event.event_type) {
                return false;
            }
        }
        if let Some(ref actors) = self.actors {
            if !actors.contains(&event.event.actor.id) {
                return false;
            }
        }
        if let Some(ref targets) = self.targets {
            if !targets.contains(&event.event.target.id) {
                return false;
            }
        }
        if let Some((start, end)) = self.time_range {
            let ts = event.event.timestamp.wall;
            if ts < start || ts > end {
                return false;
            }
        }
        if let Some(ref severities) = self.severities {
            if !severities.contains(&event.event.severity) {
                return false;
            }
        }
        if let Some(ref classes) = self.data_classes {
            if !event.event.data_classes.iter().any(|c| classes.contains(c)) {
                return false;
            }
        }
        if let Some(ref attrs) = self.compliance_attributes {
            for (k, v) in attrs {
                match event.event.compliance_attributes.get(k) {
                    Some(actual) if actual == v => {}
                    _ => return false,
                }
            }
        }
        if let Some((start, end)) = self.sequence_range {
            if event.sequence < start || event.sequence > end {
                return false;
            }
        }
        true
    }
}
