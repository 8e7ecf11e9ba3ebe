use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::SealedEvent;
use crate::severity::Severity;

/// A named predicate set evaluated against each event to decide whether to
/// deliver it to a given subscriber. A filter with no predicates matches
/// everything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    /// Filter name, unique within one connection.
    pub name: String,
    /// Whether this filter currently participates in matching.
    pub enabled: bool,
    /// Allowed event types, if restricted.
    pub event_types: Option<HashSet<String>>,
    /// Allowed actor ids, if restricted.
    pub actors: Option<HashSet<String>>,
    /// Allowed severities, if restricted.
    pub severities: Option<HashSet<Severity>>,
    /// Inclusive time window `(start, end)`, if restricted.
    pub time_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Free-form attribute equality predicates: every key must be present
    /// in the event's attribute map with exactly this string value.
    pub attributes: Option<BTreeMap<String, String>>,
}

impl Filter {
    /// Construct a filter with no predicates — matches everything.
    pub fn match_all(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            event_types: None,
            actors: None,
            severities: None,
            time_window: None,
            attributes: None,
        }
    }

    /// Evaluate this filter's predicates against a sealed event. Per spec
    /// §4.7: event-type in allowed set (if present), actor in allowed set
    /// (if present), severity in allowed set (if present), timestamp within
    /// the time window (if present), and every attribute equality predicate
    /// satisfied.
    pub fn matches(&self, event: &SealedEvent) -> bool {
        if !self.enabled {
            return false;
        }

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

        if let Some(ref severities) = self.severities {
            if !severities.contains(&event.event.severity) {
                return false;
            }
        }

        if let Some((start, end)) = self.time_window {
            let ts = event.event.timestamp.wall;
            if ts < start || ts > end {
                return false;
            }
        }

        if let Some(ref attrs) = self.attributes {
            for (k, v) in attrs {
                match event.event.attributes.get(k) {
                    Some(serde_json::Value::String(actual)) if actual == v => {}
                    _ => return false,
                }
            }
        }

        true
    }
}

/// Evaluate whether any enabled filter in `filters` matches the event. A
/// connection matches iff at least one enabled filter matches.
pub fn any_matches<'a>(filters: impl IntoIterator<Item = &'a Filter>, event: &SealedEvent) -> bool {
    filters.into_iter().any(|f| f.matches(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Actor, EventTimestamp, TargetRef, UnsealedEvent, UnsealedEventSnapshot};
    use std::collections::BTreeMap as Map;
    use uuid::Uuid;

    fn sample_event(event_type: &str, actor: &str) -> SealedEvent {
        let unsealed = UnsealedEvent {
            id: Uuid::new_v4(),
            event_type: event_type.into(),
            severity: Severity::Low,
            actor: Actor::new(actor),
            target: TargetRef::new("t1"),
            action: "read".into(),
            result: "success".into(),
            timestamp: EventTimestamp { wall: Utc::now(), monotonic_nanos: 0 },
            data_classes: Default::default(),
            legal_basis: None,
            compliance_attributes: Map::new(),
            attributes: Map::new(),
        };
        SealedEvent {
            event: UnsealedEventSnapshot::from(unsealed),
            epoch: 0,
            sequence: 1,
            hash: "h".into(),
            previous_hash: String::new(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = Filter::match_all("all");
        assert!(f.matches(&sample_event("user.created", "admin")));
    }

    #[test]
    fn type_and_actor_restriction() {
        let mut f = Filter::match_all("restricted");
        f.event_types = Some(["user.created".to_string()].into_iter().collect());
        f.actors = Some(["admin".to_string()].into_iter().collect());

        assert!(f.matches(&sample_event("user.created", "admin")));
        assert!(!f.matches(&sample_event("user.created", "bob")));
        assert!(!f.matches(&sample_event("call.completed", "admin")));
    }

    #[test]
    fn disabled_filter_never_matches() {
        let mut f = Filter::match_all("off");
        f.enabled = false;
        assert!(!f.matches(&sample_event("anything", "anyone")));
    }
}
