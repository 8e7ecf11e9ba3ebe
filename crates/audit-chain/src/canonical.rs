//! Deterministic byte encoding of an event, used both to seal and to
//! re-verify its hash. Per spec §4.3: a version byte prefixes the output so
//! future schema changes can coexist with historical verification; map keys
//! are sorted and integers are fixed-width big-endian.

use audit_types::event::UnsealedEventSnapshot;

/// Current canonical-encoding version. Bump when the field layout changes;
/// historical events keep verifying against the version byte they were
/// sealed with.
pub const CANONICAL_VERSION: u8 = 1;

fn push_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    buf.extend_from_slice(bytes);
}

fn push_str(buf: &mut Vec<u8>, s: &str) {
    push_bytes(buf, s.as_bytes());
}

fn push_opt_str(buf: &mut Vec<u8>, s: &Option<String>) {
    match s {
        Some(v) => {
            buf.push(1);
            push_str(buf, v);
        }
        None => buf.push(0),
    }
}

/// Encode an event (without its hash) plus the epoch it was sealed in, into
/// the canonical byte form fed to the causal hash.
pub fn canonical_bytes(event: &UnsealedEventSnapshot, epoch: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);
    buf.push(CANONICAL_VERSION);

    buf.extend_from_slice(event.id.as_bytes());
    push_str(&mut buf, &event.event_type);
    buf.push(severity_discriminant(event.severity));

    push_str(&mut buf, &event.actor.id);
    push_opt_str(&mut buf, &event.actor.address);
    push_opt_str(&mut buf, &event.actor.agent);
    push_opt_str(&mut buf, &event.actor.session);
    push_opt_str(&mut buf, &event.actor.correlation_id);

    push_str(&mut buf, &event.target.id);
    push_str(&mut buf, &event.action);
    push_str(&mut buf, &event.result);

    buf.extend_from_slice(&event.timestamp.wall.timestamp_nanos_opt().unwrap_or_default().to_be_bytes());
    buf.extend_from_slice(&event.timestamp.monotonic_nanos.to_be_bytes());

    let mut classes: Vec<&str> = event.data_classes.iter().map(String::as_str).collect();
    classes.sort_unstable();
    buf.extend_from_slice(&(classes.len() as u32).to_be_bytes());
    for c in classes {
        push_str(&mut buf, c);
    }

    push_opt_str(&mut buf, &event.legal_basis);

    // BTreeMap iteration is already key-sorted.
    buf.extend_from_slice(&(event.compliance_attributes.len() as u32).to_be_bytes());
    for (k, v) in &event.compliance_attributes {
        push_str(&mut buf, k);
        push_str(&mut buf, v);
    }

    buf.extend_from_slice(&(event.attributes.len() as u32).to_be_bytes());
    for (k, v) in &event.attributes {
        push_str(&mut buf, k);
        // serde_json's default map (no `preserve_order` feature) is a
        // BTreeMap, so nested objects serialize with sorted keys too.
        let v_bytes = serde_json::to_vec(v).unwrap_or_default();
        push_bytes(&mut buf, &v_bytes);
    }

    buf.extend_from_slice(&epoch.to_be_bytes());

    buf
}

fn severity_discriminant(s: audit_types::Severity) -> u8 {
    use audit_types::Severity::*;
    match s {
        Low => 0,
        Medium => 1,
        High => 2,
        Critical => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_types::event::{Actor, EventTimestamp, TargetRef, UnsealedEvent};
    use audit_types::Severity;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn sample() -> UnsealedEventSnapshot {
        UnsealedEvent {
            id: Uuid::new_v4(),
            event_type: "auth.login".into(),
            severity: Severity::Low,
            actor: Actor::new("alice"),
            target: TargetRef::new("t1"),
            action: "login".into(),
            result: "success".into(),
            timestamp: EventTimestamp { wall: chrono::Utc::now(), monotonic_nanos: 42 },
            data_classes: Default::default(),
            legal_basis: None,
            compliance_attributes: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
        .into()
    }

    #[test]
    fn encoding_is_deterministic() {
        let ev = sample();
        let a = canonical_bytes(&ev, 0);
        let b = canonical_bytes(&ev, 0);
        assert_eq!(a, b);
    }

    #[test]
    fn different_epoch_changes_encoding() {
        let ev = sample();
        assert_ne!(canonical_bytes(&ev, 0), canonical_bytes(&ev, 1));
    }

    #[test]
    fn attribute_key_order_does_not_affect_encoding() {
        let mut ev = sample();
        ev.attributes.insert("a".into(), serde_json::json!(1));
        ev.attributes.insert("b".into(), serde_json::json!(2));
        let first = canonical_bytes(&ev, 0);

        let mut ev2 = sample();
        ev2.attributes.insert("b".into(), serde_json::json!(2));
        ev2.attributes.insert("a".into(), serde_json::json!(1));
        let second = canonical_bytes(&ev2, 0);

        assert_eq!(first, second);
    }
}
