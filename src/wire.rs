//! Typed wire payloads for the subsystem's endpoints (JSON over HTTPS).
//!
//! Every loosely-typed body is validated into one of these structs at the
//! transport boundary; malformed hex, points, or nested JSON are rejected
//! here, before any cryptographic logic runs.

use crate::*;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    pub authority_id: AuthorityId,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeReply {
    pub challenge: String,
    pub expires_in: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAuthorityRequest {
    pub authority_id: AuthorityId,
    pub challenge: String,

    /// JSON-encoded `{"signature": ..., "timestamp": ...}` as produced by
    /// the client-side signer.
    pub response: String,
    pub public_key_fingerprint: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyAuthorityReply {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WireCiphertext {
    pub c1: String,
    pub c2: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub encrypted_vote: WireCiphertext,
    pub election_id: ElectionId,
    pub authority_id: AuthorityId,
    pub key_share_id: KeyShareId,

    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub public_key_fingerprint: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReply {
    pub id: u32,
    pub partial_decryption: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WirePartial {
    pub id: u32,
    pub partial_decryption: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WireContribution {
    pub authority_id: AuthorityId,

    /// Keyed by vote id (JSON object keys are strings).
    pub votes: IndexMap<String, WirePartial>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DecryptRequest {
    pub election_id: ElectionId,
    pub partial_decryptions: Vec<WireContribution>,
}

// These two stay snake_case on the wire, matching the persisted results
// shape downstream consumers already read.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct WirePositionResult {
    pub position_id: PositionId,
    pub candidate_results: IndexMap<CandidateId, u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DecryptReply {
    pub success: bool,
    pub results: Vec<WirePositionResult>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyProofRequest {
    pub proof: ProofJson,
    pub public_signals: Vec<String>,
    pub election_id: ElectionId,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VerifyProofReply {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl VerifyAuthorityRequest {
    pub fn credentials(&self) -> Result<AuthCredentials, Error> {
        let response: ChallengeResponse = serde_json::from_str(&self.response)
            .map_err(|e| Error::MalformedResponse(format!("{}", e)))?;
        Ok(AuthCredentials {
            authority_id: self.authority_id,
            challenge: self.challenge.clone(),
            response,
            public_key_fingerprint: self.public_key_fingerprint.clone(),
        })
    }
}

impl SubmitRequest {
    /// Credentials are present only when all three auth fields are. A
    /// partially-filled set is treated as absent, which the submitter then
    /// rejects with `AuthenticationRequired`.
    pub fn credentials(&self) -> Result<Option<AuthCredentials>, Error> {
        match (&self.challenge, &self.response, &self.public_key_fingerprint) {
            (Some(challenge), Some(response), Some(fingerprint)) => {
                let response: ChallengeResponse = serde_json::from_str(response)
                    .map_err(|e| Error::MalformedResponse(format!("{}", e)))?;
                Ok(Some(AuthCredentials {
                    authority_id: self.authority_id,
                    challenge: challenge.clone(),
                    response,
                    public_key_fingerprint: fingerprint.clone(),
                }))
            }
            _ => Ok(None),
        }
    }

    pub fn ciphertext(&self) -> Result<Ciphertext, Error> {
        self.encrypted_vote.decode()
    }
}

impl WireCiphertext {
    pub fn encode(ciphertext: &Ciphertext) -> Self {
        WireCiphertext {
            c1: point_to_hex(&ciphertext.c1),
            c2: point_to_hex(&ciphertext.c2),
        }
    }

    pub fn decode(&self) -> Result<Ciphertext, Error> {
        Ok(Ciphertext {
            c1: point_from_hex(&self.c1)?,
            c2: point_from_hex(&self.c2)?,
        })
    }
}

impl DecryptRequest {
    pub fn contributions(&self) -> Result<Vec<AuthorityContribution>, Error> {
        self.partial_decryptions
            .iter()
            .map(|wire| {
                let votes = wire
                    .votes
                    .iter()
                    .map(|(vote_id, partial)| {
                        let vote_id: VoteId = vote_id
                            .parse()
                            .map_err(|_| Error::MalformedResponse(format!("bad vote id {:?}", vote_id)))?;
                        Ok((vote_id, point_from_hex(&partial.partial_decryption)?))
                    })
                    .collect::<Result<IndexMap<_, _>, Error>>()?;
                Ok(AuthorityContribution {
                    authority_id: wire.authority_id,
                    votes,
                })
            })
            .collect()
    }
}

/// `POST /challenge`
pub fn handle_challenge(
    panel: &mut DecryptionPanel,
    request: &ChallengeRequest,
    now: DateTime<Utc>,
) -> Result<ChallengeReply, Error> {
    let challenge = panel.request_challenge(request.authority_id, now)?;
    Ok(ChallengeReply {
        expires_in: challenge.expires_in(now),
        challenge: challenge.nonce,
    })
}

/// `POST /verify-authority`
pub fn handle_verify_authority(
    panel: &mut DecryptionPanel,
    request: &VerifyAuthorityRequest,
    now: DateTime<Utc>,
) -> Result<VerifyAuthorityReply, Error> {
    let credentials = match request.credentials() {
        Ok(credentials) => credentials,
        Err(e) => {
            return Ok(VerifyAuthorityReply {
                valid: false,
                message: Some(format!("{}", e)),
            })
        }
    };

    let valid = panel.verify_authority(&credentials, now)?;
    Ok(VerifyAuthorityReply {
        valid,
        message: if valid {
            None
        } else {
            Some("authentication failed".to_string())
        },
    })
}

/// `POST /votes/{vote_id}/partial-decryption`
pub fn handle_submit(
    panel: &mut DecryptionPanel,
    vote_id: VoteId,
    request: &SubmitRequest,
    now: DateTime<Utc>,
) -> Result<SubmitReply, Error> {
    let credentials = request.credentials()?;
    let ciphertext = request.ciphertext()?;

    let receipt = panel.submit_one(
        vote_id,
        &ciphertext,
        request.key_share_id,
        credentials.as_ref(),
        now,
    )?;

    Ok(SubmitReply {
        id: receipt.id,
        partial_decryption: point_to_hex(&receipt.partial_decryption),
    })
}

/// `POST /decrypt-election-results`
///
/// Stateless with respect to the panel: the caller supplies the collected
/// contributions and gets tallies back. Persisting them is the results
/// subsystem's job.
pub fn handle_decrypt(
    meta: &CryptoMeta,
    votes: &VoteStore,
    request: &DecryptRequest,
    max_candidate: CandidateId,
) -> Result<DecryptReply, Error> {
    // The body's election id must agree with the votes it is applied to
    for vote in votes.iter() {
        if vote.election_id != request.election_id {
            return Err(Error::ElectionMismatch {
                expected: request.election_id,
                vote: vote.id,
                got: vote.election_id,
            });
        }
    }

    let contributions = request.contributions()?;
    let outcome = decrypt_election_results(meta, votes, &contributions, max_candidate)?;

    Ok(DecryptReply {
        success: true,
        results: outcome
            .results
            .into_iter()
            .map(|r| WirePositionResult {
                position_id: r.position_id,
                candidate_results: r.candidate_results,
            })
            .collect(),
    })
}

/// `POST /verify-zkp`
pub fn handle_verify_proof(
    verifier: &ZkpVerifier,
    request: &VerifyProofRequest,
) -> Result<VerifyProofReply, Error> {
    let valid = verifier.verify(request.election_id, &request.proof, &request.public_signals)?;
    Ok(VerifyProofReply {
        valid,
        message: if valid {
            None
        } else {
            Some("proof did not verify".to_string())
        },
    })
}
