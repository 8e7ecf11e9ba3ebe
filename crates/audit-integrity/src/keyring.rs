use std::collections::BTreeMap;

use audit_chain::Sealer;
use audit_types::chain::ChainEpoch;

/// Resolves the `Sealer` (and therefore the secret key) that sealed a given
/// epoch. Per spec §9's Open Question #2, a key rotation starts a new chain
/// epoch rather than continuing the old one under a new key, so
/// verification must be able to look up the correct key per epoch rather
/// than assuming a single process-wide key.
#[derive(Debug, Default, Clone)]
pub struct EpochKeyring {
    sealers: BTreeMap<ChainEpoch, Sealer>,
}

impl EpochKeyring {
    /// An empty keyring with no epochs registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sealer for one epoch, replacing any prior registration.
    pub fn register(&mut self, sealer: Sealer) {
        self.sealers.insert(sealer.epoch(), sealer);
    }

    /// Look up the sealer for `epoch`, if known.
    pub fn resolve(&self, epoch: ChainEpoch) -> Option<&Sealer> {
        self.sealers.get(&epoch)
    }
}

impl FromIterator<Sealer> for EpochKeyring {
    fn from_iter<T: IntoIterator<Item = Sealer>>(iter: T) -> Self {
        let mut keyring = Self::new();
        for sealer in iter {
            keyring.register(sealer);
        }
        keyring
    }
}
