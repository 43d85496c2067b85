use crate::*;

use thiserror::Error;

/// Error types
///
/// Protocol and encoding errors are kept distinct from "merely invalid"
/// outcomes: a signature that fails to verify or a proof that fails the
/// pairing check is reported as a `false` result at the verifying boundary,
/// never as one of these errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error("quorumtally: signature error: {0}")]
    SignatureError(#[from] ed25519_dalek::SignatureError),

    #[error("quorumtally: unknown authority {0}")]
    UnknownAuthority(AuthorityId),

    #[error("quorumtally: authentication required: no valid challenge credentials")]
    AuthenticationRequired,

    #[error("quorumtally: no challenge outstanding for authority {0}")]
    NoChallengeIssued(AuthorityId),

    #[error("quorumtally: not enough partial decryptions: need {needed} more (threshold {threshold}, submitted {submitted})")]
    InsufficientShares {
        threshold: usize,
        submitted: usize,
        needed: usize,
    },

    #[error("quorumtally: encrypted vote {0} not found")]
    VoteNotFound(VoteId),

    #[error("quorumtally: request is for election {expected}, but vote {vote} belongs to election {got}")]
    ElectionMismatch {
        expected: ElectionId,
        vote: VoteId,
        got: ElectionId,
    },

    #[error("quorumtally: key share {0} not found")]
    KeyShareNotFound(KeyShareId),

    #[error("quorumtally: no key share dealt to authority {0}")]
    NoShareForAuthority(AuthorityId),

    #[error("quorumtally: key share {key_share} does not belong to authority {authority}")]
    KeyShareMismatch {
        key_share: KeyShareId,
        authority: AuthorityId,
    },

    #[error("quorumtally: no crypto config for election {0} with key type {1}")]
    ConfigMissing(ElectionId, KeyType),

    #[error("quorumtally: crypto config for election {0} with key type {1} already exists")]
    ConfigAlreadyExists(ElectionId, KeyType),

    #[error("quorumtally: threshold is invalid for number of key shares")]
    InvalidThreshold,

    #[error("quorumtally: decryption round for election {0} is already finished")]
    AlreadyDecrypted(ElectionId),

    #[error("quorumtally: no vote could be decrypted")]
    NoVotesResolved,

    #[error("quorumtally: plaintext point is outside the candidate domain")]
    PlaintextOutOfDomain,

    #[error("quorumtally: malformed group element: {0}")]
    MalformedPoint(String),

    #[error("quorumtally: malformed challenge response: {0}")]
    MalformedResponse(String),

    #[error("quorumtally: JSON error deserializing payload: {0}")]
    JSONDeserialization(#[from] serde_json::Error),

    #[error("quorumtally: no verification key registered for election {0}")]
    VerificationKeyMissing(ElectionId),

    #[error("quorumtally: malformed verification key: {0}")]
    MalformedVerificationKey(String),

    #[error("quorumtally: malformed proof: {0}")]
    MalformedProof(String),

    #[error("quorumtally: wrong number of public signals: expected {expected}, got {got}")]
    PublicSignalMismatch { expected: usize, got: usize },

    #[error("quorumtally: proof verification could not be performed: {0}")]
    VerificationError(String),

    #[error("quorumtally: bad circuit artifact: {0}")]
    BadArtifact(String),
}
