use serde::{Deserialize, Serialize};

/// Identifies a chain epoch. A new epoch begins whenever the hash secret
/// key is rotated — per spec §9's Open Question #2, key rotation starts a
/// new chain with its own sequence space rather than silently continuing
/// the previous chain under a new key.
pub type ChainEpoch = u32;

/// Process-wide chain-tip state: the last sealed sequence number and hash
/// within the current epoch. Protected by a mutex in `audit-batch`;
/// readers (integrity engine, status endpoint) take a shared snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainTip {
    /// Current epoch.
    pub epoch: ChainEpoch,
    /// Last sealed sequence number, or 0 if the epoch has no events yet.
    pub last_sequence: u64,
    /// Hex-encoded hash of the last sealed event, or empty string if the
    /// epoch has no events yet.
    pub last_hash: String,
}

impl ChainTip {
    /// The genesis tip for a fresh epoch: sequence 0, empty hash.
    pub fn genesis(epoch: ChainEpoch) -> Self {
        Self {
            epoch,
            last_sequence: 0,
            last_hash: String::new(),
        }
    }

    /// Advance the tip after sealing one event.
    pub fn advance(&mut self, sequence: u64, hash: String) {
        self.last_sequence = sequence;
        self.last_hash = hash;
    }
}
