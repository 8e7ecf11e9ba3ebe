#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **audit-chain** – Hash-chain sealing for the Toka audit subsystem.
//!
//! Owns the canonical byte encoding and the causal (MAC) hash function, and
//! the `Sealer` that turns an `UnsealedEvent` plus the current `ChainTip`
//! into an immutable `SealedEvent`.

/// Deterministic canonical byte encoding.
pub mod canonical;
/// Causal (MAC) hash function and hex codec.
pub mod hash;

pub use canonical::{canonical_bytes, CANONICAL_VERSION};
pub use hash::{causal_hash, from_hex, to_hex, Digest};

use audit_types::config::HashSecretKey;
use audit_types::event::{SealedEvent, UnsealedEvent, UnsealedEventSnapshot};
use audit_types::{AuditError, ChainTip};

/// Seals events onto a hash chain using a fixed secret key and epoch.
///
/// The sealer is stateless beyond its key and epoch id: chain-tip state
/// lives in the caller's `ChainTip`, mutated under whatever lock the batch
/// worker holds (spec §4.2/§4.3 — the lock is held only for sealing, never
/// for the store write that follows).
#[derive(Debug, Clone)]
pub struct Sealer {
    secret_key: HashSecretKey,
    epoch: u32,
}

impl Sealer {
    /// Construct a sealer for the given epoch. Refuses to start with a key
    /// shorter than `HashSecretKey::MIN_LEN` (spec §4.3).
    pub fn new(secret_key: HashSecretKey, epoch: u32) -> Result<Self, AuditError> {
        if secret_key.len() < HashSecretKey::MIN_LEN {
            return Err(AuditError::Validation(format!(
                "hash secret key must be at least {} bytes, got {}",
                HashSecretKey::MIN_LEN,
                secret_key.len()
            )));
        }
        Ok(Self { secret_key, epoch })
    }

    /// The epoch this sealer seals into.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Seal one event against the given chain tip, advancing the tip on
    /// success. The tip is only mutated if sealing succeeds.
    pub fn seal(&self, event: UnsealedEvent, tip: &mut ChainTip) -> Result<SealedEvent, AuditError> {
        event.validate().map_err(AuditError::Validation)?;

        let snapshot: UnsealedEventSnapshot = event.into();
        let sequence = tip.last_sequence + 1;

        let previous_digest: Vec<u8> = if tip.last_hash.is_empty() {
            Vec::new()
        } else {
            from_hex(&tip.last_hash)
                .ok_or_else(|| AuditError::IntegrityViolation("corrupt chain-tip hash".into()))?
                .to_vec()
        };

        let canonical = canonical_bytes(&snapshot, self.epoch);
        let digest = causal_hash(&canonical, &previous_digest, self.secret_key.as_bytes());
        let hash_hex = to_hex(&digest);
        let previous_hash = tip.last_hash.clone();

        tip.advance(sequence, hash_hex.clone());

        Ok(SealedEvent {
            event: snapshot,
            epoch: self.epoch,
            sequence,
            hash: hash_hex,
            previous_hash,
        })
    }

    /// Recompute the hash a sealed event should have, for integrity
    /// verification. Does not consult or mutate any chain tip.
    pub fn recompute(&self, sealed: &SealedEvent) -> Result<Digest, AuditError> {
        let previous_digest: Vec<u8> = if sealed.previous_hash.is_empty() {
            Vec::new()
        } else {
            from_hex(&sealed.previous_hash)
                .ok_or_else(|| AuditError::IntegrityViolation("malformed previous_hash".into()))?
                .to_vec()
        };
        let canonical = canonical_bytes(&sealed.event, sealed.epoch);
        Ok(causal_hash(&canonical, &previous_digest, self.secret_key.as_bytes()))
    }

    /// Verify a single sealed event's hash against its stored hash.
    pub fn verify_hash(&self, sealed: &SealedEvent) -> Result<bool, AuditError> {
        let recomputed = self.recompute(sealed)?;
        Ok(to_hex(&recomputed) == sealed.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use audit_types::event::{Actor, EventTimestamp, TargetRef};
    use audit_types::Severity;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn key() -> HashSecretKey {
        HashSecretKey::from_bytes(vec![7u8; 32])
    }

    fn unsealed(actor: &str) -> UnsealedEvent {
        UnsealedEvent {
            id: Uuid::new_v4(),
            event_type: "auth.login".into(),
            severity: Severity::Low,
            actor: Actor::new(actor),
            target: TargetRef::new("t1"),
            action: "login".into(),
            result: "success".into(),
            timestamp: EventTimestamp { wall: chrono::Utc::now(), monotonic_nanos: 1 },
            data_classes: Default::default(),
            legal_basis: None,
            compliance_attributes: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    #[test]
    fn rejects_short_key() {
        let short = HashSecretKey::from_bytes(vec![1u8; 16]);
        assert!(Sealer::new(short, 0).is_err());
    }

    #[test]
    fn first_event_has_empty_previous_hash() {
        let sealer = Sealer::new(key(), 0).unwrap();
        let mut tip = ChainTip::genesis(0);
        let sealed = sealer.seal(unsealed("alice"), &mut tip).unwrap();
        assert_eq!(sealed.sequence, 1);
        assert_eq!(sealed.previous_hash, "");
        assert!(sealer.verify_hash(&sealed).unwrap());
    }

    #[test]
    fn chain_links_previous_hash_to_hash() {
        let sealer = Sealer::new(key(), 0).unwrap();
        let mut tip = ChainTip::genesis(0);
        let first = sealer.seal(unsealed("alice"), &mut tip).unwrap();
        let second = sealer.seal(unsealed("bob"), &mut tip).unwrap();

        assert_eq!(second.sequence, 2);
        assert_eq!(second.previous_hash, first.hash);
        assert!(sealer.verify_hash(&first).unwrap());
        assert!(sealer.verify_hash(&second).unwrap());
    }

    #[test]
    fn tampering_breaks_verification() {
        let sealer = Sealer::new(key(), 0).unwrap();
        let mut tip = ChainTip::genesis(0);
        let mut sealed = sealer.seal(unsealed("alice"), &mut tip).unwrap();
        sealed.event.actor.id = "mallory".into();
        assert!(!sealer.verify_hash(&sealed).unwrap());
    }

    #[test]
    fn tip_unchanged_on_validation_failure() {
        let sealer = Sealer::new(key(), 0).unwrap();
        let mut tip = ChainTip::genesis(0);
        let bad = unsealed("");
        assert!(sealer.seal(bad, &mut tip).is_err());
        assert_eq!(tip.last_sequence, 0);
    }
}
