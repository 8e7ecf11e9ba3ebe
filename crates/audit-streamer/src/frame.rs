use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use audit_types::{Filter, Severity};
use audit_types::event::SealedEvent;

/// Wire-level predicate set for `add_filter`, per spec §6's subscribe
/// transport: `add_filter{name, predicates}`. Separate from
/// `audit_types::Filter` because the wire format omits `name`/`enabled`
/// (those are frame-level, not predicate-level) and because keeping the
/// wire schema decoupled from the internal type lets either evolve
/// independently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterPredicates {
    /// See `Filter::event_types`.
    #[serde(default)]
    pub event_types: Option<HashSet<String>>,
    /// See `Filter::actors`.
    #[serde(default)]
    pub actors: Option<HashSet<String>>,
    /// See `Filter::severities`.
    #[serde(default)]
    pub severities: Option<HashSet<Severity>>,
    /// See `Filter::time_window`.
    #[serde(default)]
    pub time_window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// See `Filter::attributes`.
    #[serde(default)]
    pub attributes: Option<BTreeMap<String, String>>,
}

impl FilterPredicates {
    /// Build the internal `Filter` this wire predicate set describes.
    pub fn into_filter(self, name: String) -> Filter {
        Filter {
            name,
            enabled: true,
            event_types: self.event_types,
            actors: self.actors,
            severities: self.severities,
            time_window: self.time_window,
            attributes: self.attributes,
        }
    }
}

/// Client → server frames, per spec §6. Unknown `type` values deserialize
/// to neither variant and are ignored by the dispatcher (serde returns an
/// error the caller discards, matching "unknown messages are ignored").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Register or replace a named filter on the sending connection.
    AddFilter {
        /// Filter name; replaces any existing filter with the same name.
        name: String,
        /// The predicate set this filter evaluates.
        predicates: FilterPredicates,
    },
    /// Remove a previously-registered filter by name. Removing an unknown
    /// name is a no-op, not an error.
    RemoveFilter {
        /// Name of the filter to remove.
        name: String,
    },
    /// Liveness probe; answered with `pong` and counts as activity for the
    /// idle-TTL sweeper.
    Ping,
}

/// Server → client frames, per spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Sent immediately after a connection is registered.
    Welcome {
        /// The id assigned to the new connection.
        connection_id: Uuid,
    },
    /// A sealed event matching at least one of the connection's enabled
    /// filters.
    AuditEvent {
        /// The matching event, flattened onto the frame.
        #[serde(flatten)]
        event: Box<SealedEvent>,
    },
    /// Answer to a client `ping`.
    Pong,
    /// Reports a connection-scoped problem: invalid filter, rate-limited
    /// burst, or max-connections reached (spec §7).
    Error {
        /// Machine-readable error code, e.g. `rate_limited`, `invalid_filter`.
        code: String,
        /// Human-readable detail.
        message: String,
    },
    /// Sent to every connection during graceful shutdown (spec §4.8)
    /// before the connection is closed.
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_filter_round_trips_through_json() {
        let frame = ClientFrame::AddFilter {
            name: "mine".into(),
            predicates: FilterPredicates { actors: Some(["admin".to_string()].into_iter().collect()), ..Default::default() },
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("\"type\":\"add_filter\""));
        let back: ClientFrame = serde_json::from_str(&json).unwrap();
        match back {
            ClientFrame::AddFilter { name, .. } => assert_eq!(name, "mine"),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_frame_type_fails_to_parse_and_is_ignored_by_caller() {
        let raw = r#"{"type":"teleport","target":"moon"}"#;
        assert!(serde_json::from_str::<ClientFrame>(raw).is_err());
    }

    #[test]
    fn welcome_frame_serializes_connection_id() {
        let id = Uuid::new_v4();
        let frame = ServerFrame::Welcome { connection_id: id };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(&id.to_string()));
    }
}
