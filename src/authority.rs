use crate::*;
use digest::Digest;
use ed25519_dalek::Keypair;
use ed25519_dalek::PublicKey;
use ed25519_dalek::SecretKey;
use std::collections::BTreeMap;

/// A trusted authority safeguards one share of the election decryption key.
///
/// Most elections will have a handful of authorities (between 3 and 7), with
/// the threshold set to about 2/3 the total number of shares. Any quorum of
/// authorities may jointly decrypt the votes; fewer learn nothing.
///
/// Authorities are created at election-setup time and are immutable
/// thereafter. The `id` doubles as the Shamir x-coordinate of the
/// authority's key share, so it must be non-zero and unique per election.
#[derive(Serialize, Deserialize, Clone)]
pub struct TrustedAuthority {
    pub id: AuthorityId,
    pub name: String,

    #[serde(with = "EdPublicKeyHex")]
    pub public_key: PublicKey,

    /// Lowercase hex SHA-256 of the raw public key bytes. This is what an
    /// authority presents during challenge-response authentication.
    pub public_key_fingerprint: String,
}

impl TrustedAuthority {
    /// Create a new authority with a fresh ed25519 identity keypair.
    ///
    /// The secret key is returned to the caller and never stored here.
    pub fn new(id: AuthorityId, name: &str) -> (Self, SecretKey) {
        if id == 0 {
            panic!("Authority id cannot be zero");
        }

        let (secret, public) = generate_keypair();

        let authority = TrustedAuthority {
            id,
            name: name.to_string(),
            public_key_fingerprint: key_fingerprint(&public),
            public_key: public,
        };
        (authority, secret)
    }
}

/// Compute the fingerprint under which an authority's public key is
/// registered.
pub fn key_fingerprint(public_key: &PublicKey) -> String {
    hex::encode(sha2::Sha256::digest(public_key.as_bytes()))
}

pub fn generate_keypair() -> (SecretKey, PublicKey) {
    let mut csprng = rand::rngs::OsRng {};
    let Keypair { public, secret } = Keypair::generate(&mut csprng);
    (secret, public)
}

/// The set of authorities registered for one election.
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct AuthorityRoster {
    authorities: BTreeMap<AuthorityId, TrustedAuthority>,
}

impl AuthorityRoster {
    pub fn new(authorities: Vec<TrustedAuthority>) -> Self {
        let authorities = authorities.into_iter().map(|a| (a.id, a)).collect();
        AuthorityRoster { authorities }
    }

    pub fn get(&self, id: AuthorityId) -> Option<&TrustedAuthority> {
        self.authorities.get(&id)
    }

    /// Look up an authority, erroring for ids that were never registered.
    pub fn require(&self, id: AuthorityId) -> Result<&TrustedAuthority, Error> {
        self.get(id).ok_or(Error::UnknownAuthority(id))
    }

    pub fn len(&self) -> usize {
        self.authorities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authorities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrustedAuthority> {
        self.authorities.values()
    }
}
