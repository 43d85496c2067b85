use crate::*;
use curve25519_dalek::ristretto::RistrettoPoint;
use std::collections::BTreeMap;
use std::fmt;

pub type ElectionId = u32;
pub type AuthorityId = u32;
pub type VoteId = u32;
pub type KeyShareId = u32;
pub type PositionId = u32;
pub type CandidateId = u32;

/// The kind of key material a crypto config carries.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    ThresholdElgamal,
    Paillier,
    VerificationKey,
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            KeyType::ThresholdElgamal => "threshold_elgamal",
            KeyType::Paillier => "paillier",
            KeyType::VerificationKey => "verification_key",
        };
        write!(f, "{}", name)
    }
}

/// Threshold parameters carried in `CryptoConfig.meta`.
#[derive(Serialize, Deserialize, Copy, Clone, Debug)]
pub struct CryptoMeta {
    pub threshold: usize,
    pub total_shares: usize,
}

impl CryptoMeta {
    pub fn new(threshold: usize, total_shares: usize) -> Result<Self, Error> {
        if threshold == 0 || threshold > total_shares {
            return Err(Error::InvalidThreshold);
        }
        Ok(CryptoMeta {
            threshold,
            total_shares,
        })
    }
}

/// Per-election cryptographic parameters.
///
/// Created once at election creation and read-only during voting and
/// decryption. Exactly one active config exists per `(election_id, key_type)`;
/// the registry enforces this.
#[derive(Serialize, Deserialize, Clone)]
pub struct CryptoConfig {
    pub election_id: ElectionId,
    pub key_type: KeyType,

    /// The joint election public key (compressed ristretto point, hex).
    #[serde(with = "RistrettoHex")]
    pub public_key: RistrettoPoint,

    pub meta: CryptoMeta,
}

#[derive(Default, Clone)]
pub struct CryptoConfigRegistry {
    configs: BTreeMap<(ElectionId, KeyType), CryptoConfig>,
}

impl CryptoConfigRegistry {
    /// Register a config, rejecting a second active config for the same
    /// `(election_id, key_type)` pair.
    pub fn insert(&mut self, config: CryptoConfig) -> Result<(), Error> {
        let key = (config.election_id, config.key_type);
        if self.configs.contains_key(&key) {
            return Err(Error::ConfigAlreadyExists(config.election_id, config.key_type));
        }
        self.configs.insert(key, config);
        Ok(())
    }

    pub fn get(&self, election_id: ElectionId, key_type: KeyType) -> Result<&CryptoConfig, Error> {
        self.configs
            .get(&(election_id, key_type))
            .ok_or(Error::ConfigMissing(election_id, key_type))
    }
}
