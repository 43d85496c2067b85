use crate::*;
use chrono::{DateTime, Utc};
use curve25519_dalek::ristretto::RistrettoPoint;
use indexmap::IndexMap;
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// One authority's contribution toward decrypting one vote.
///
/// At most one exists per `(vote_id, authority_id)`; the ledger enforces
/// this. Created on submit, read by the aggregator, never mutated.
#[derive(Serialize, Deserialize, Copy, Clone, Debug)]
pub struct PartialDecryption {
    pub id: u32,
    pub vote_id: VoteId,
    pub authority_id: AuthorityId,

    #[serde(with = "RistrettoHex")]
    pub value: RistrettoPoint,
}

/// What a submit call hands back. `already_submitted` marks the idempotent
/// path: the prior record was returned and nothing was appended.
#[derive(Clone, Debug)]
pub struct SubmissionReceipt {
    pub id: u32,
    pub vote_id: VoteId,
    pub partial_decryption: RistrettoPoint,
    pub already_submitted: bool,
}

/// Server-side custody of the dealt key shares.
///
/// This is an explicit trust boundary: the modular exponentiation over the
/// stored share happens here, on the server, rather than on an
/// authority-held device. See DESIGN.md for the open question this records.
#[derive(Default, Clone)]
pub struct KeyShareVault {
    shares: BTreeMap<KeyShareId, KeyShare>,
}

impl KeyShareVault {
    pub fn new(shares: Vec<KeyShare>) -> Self {
        let shares = shares.into_iter().map(|s| (s.id, s)).collect();
        KeyShareVault { shares }
    }

    pub fn require(&self, id: KeyShareId) -> Result<&KeyShare, Error> {
        self.shares.get(&id).ok_or(Error::KeyShareNotFound(id))
    }

    /// The share dealt to a given authority, if any.
    pub fn share_for_authority(&self, authority_id: AuthorityId) -> Option<&KeyShare> {
        self.shares.values().find(|s| s.authority_id == authority_id)
    }
}

/// Append-only record of submitted partial decryptions, keyed by
/// `(vote_id, authority_id)` so two submissions for the same pair can never
/// both count toward the threshold.
#[derive(Default, Clone)]
pub struct SubmissionLedger {
    entries: IndexMap<(VoteId, AuthorityId), PartialDecryption>,
    next_id: u32,
}

impl SubmissionLedger {
    pub fn get(&self, vote_id: VoteId, authority_id: AuthorityId) -> Option<&PartialDecryption> {
        self.entries.get(&(vote_id, authority_id))
    }

    fn append(
        &mut self,
        vote_id: VoteId,
        authority_id: AuthorityId,
        value: RistrettoPoint,
    ) -> &PartialDecryption {
        self.next_id += 1;
        let record = PartialDecryption {
            id: self.next_id,
            vote_id,
            authority_id,
            value,
        };
        self.entries.entry((vote_id, authority_id)).or_insert(record)
    }

    /// Distinct authorities that have contributed at least one partial
    /// decryption. Deduplicated by identity, not by submission events.
    pub fn submitted_authorities(&self) -> BTreeSet<AuthorityId> {
        self.entries.keys().map(|(_, authority_id)| *authority_id).collect()
    }

    /// All contributions for one vote.
    pub fn partials_for_vote(&self, vote_id: VoteId) -> Vec<&PartialDecryption> {
        self.entries
            .iter()
            .filter(|((v, _), _)| *v == vote_id)
            .map(|(_, record)| record)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Computes and records decryption shares for authenticated authorities.
pub struct PartialDecryptionSubmitter {
    pub vault: KeyShareVault,
    pub ledger: SubmissionLedger,
}

impl PartialDecryptionSubmitter {
    pub fn new(vault: KeyShareVault) -> Self {
        PartialDecryptionSubmitter {
            vault,
            ledger: SubmissionLedger::default(),
        }
    }

    /// Submit one authority's partial decryption for one vote.
    ///
    /// Every submission must carry credentials backed by a live
    /// authenticated session; a stale or absent session is
    /// `AuthenticationRequired`. Duplicate submissions return the prior
    /// record unchanged.
    pub fn submit(
        &mut self,
        vote: &EncryptedVote,
        key_share_id: KeyShareId,
        credentials: Option<&AuthCredentials>,
        issuer: &ChallengeIssuer,
        roster: &AuthorityRoster,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt, Error> {
        let credentials = credentials.ok_or(Error::AuthenticationRequired)?;
        if !issuer.check_session(roster, credentials, now)? {
            return Err(Error::AuthenticationRequired);
        }

        let share = self.vault.require(key_share_id)?;
        if share.authority_id != credentials.authority_id {
            return Err(Error::KeyShareMismatch {
                key_share: key_share_id,
                authority: credentials.authority_id,
            });
        }

        if let Some(existing) = self.ledger.get(vote.id, share.authority_id) {
            log::debug!(
                "authority {} resubmitted for vote {}; returning prior record",
                share.authority_id,
                vote.id
            );
            return Ok(SubmissionReceipt {
                id: existing.id,
                vote_id: existing.vote_id,
                partial_decryption: existing.value,
                already_submitted: true,
            });
        }

        let value = partial_decrypt(share, &vote.ciphertext);
        let record = self.ledger.append(vote.id, share.authority_id, value);

        Ok(SubmissionReceipt {
            id: record.id,
            vote_id: record.vote_id,
            partial_decryption: record.value,
            already_submitted: false,
        })
    }
}
