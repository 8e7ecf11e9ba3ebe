//! Causal hashing for the audit hash chain.
//!
//! `digest = Blake3(canonical_bytes(event) || previous_digest || secret_key)`.
//! The secret key participates as a MAC so an attacker with store access
//! alone cannot forge valid continuations (spec §4.3).

use blake3::Hasher;

/// 32-byte Blake3 digest.
pub type Digest = [u8; 32];

/// Compute the causal digest of a canonically-encoded event.
pub fn causal_hash(canonical: &[u8], previous_digest: &[u8], secret_key: &[u8]) -> Digest {
    let mut hasher = Hasher::new();
    hasher.update(canonical);
    hasher.update(previous_digest);
    hasher.update(secret_key);
    *hasher.finalize().as_bytes()
}

/// Hex-encode a digest for storage/display.
pub fn to_hex(digest: &Digest) -> String {
    let mut s = String::with_capacity(64);
    for byte in digest {
        s.push_str(&format!("{byte:02x}"));
    }
    s
}

/// Decode a hex-encoded digest. Returns `None` for malformed input.
pub fn from_hex(s: &str) -> Option<Digest> {
    if s.len() != 64 {
        return None;
    }
    let mut out = [0u8; 32];
    for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
        let hi = (chunk[0] as char).to_digit(16)?;
        let lo = (chunk[1] as char).to_digit(16)?;
        out[i] = ((hi << 4) | lo) as u8;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trips() {
        let digest = causal_hash(b"payload", b"", b"0123456789012345678901234567890123");
        let hex = to_hex(&digest);
        assert_eq!(from_hex(&hex).unwrap(), digest);
    }

    #[test]
    fn from_hex_rejects_bad_length() {
        assert!(from_hex("abcd").is_none());
    }
}
