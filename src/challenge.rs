use crate::*;
use chrono::{DateTime, Duration, Utc};
use ed25519_dalek::ExpandedSecretKey;
use ed25519_dalek::PublicKey;
use ed25519_dalek::SecretKey;
use ed25519_dalek::Signature;
use rand::RngCore;
use std::collections::HashMap;

/// How long an issued challenge stays valid, unless overridden.
pub const CHALLENGE_EXPIRY_SECONDS: i64 = 300;

/// Lifecycle of a challenge. There is no transition out of `Consumed` or
/// `Expired`; retrying authentication requires a fresh challenge.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeState {
    Issued,
    Consumed,
    Expired,
}

/// A one-time nonce bound to an authority, with an expiry window.
#[derive(Serialize, Deserialize, Clone)]
pub struct Challenge {
    pub nonce: String,
    pub authority_id: AuthorityId,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub state: ChallengeState,
}

impl Challenge {
    pub fn expires_in(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// The client-side half of challenge-response authentication: a signature
/// over the UTF-8 string `"{challenge}:{timestamp}"`.
#[derive(Serialize, Deserialize, Clone)]
pub struct ChallengeResponse {
    #[serde(with = "EdSignatureHex")]
    pub signature: Signature,
    pub timestamp: i64,
}

/// Everything an authority presents to authenticate one action.
#[derive(Clone)]
pub struct AuthCredentials {
    pub authority_id: AuthorityId,
    pub challenge: String,
    pub response: ChallengeResponse,
    pub public_key_fingerprint: String,
}

/// Sign a challenge with the authority's private key. Purely client-side;
/// the key never reaches the issuer.
pub fn respond_to_challenge(
    challenge: &str,
    secret_key_bytes: &[u8],
    now: DateTime<Utc>,
) -> Result<ChallengeResponse, Error> {
    let secret = SecretKey::from_bytes(secret_key_bytes)?;
    let public = PublicKey::from(&secret);

    let timestamp = now.timestamp();
    let payload = format!("{}:{}", challenge, timestamp);

    let expanded: ExpandedSecretKey = (&secret).into();
    let signature = expanded.sign(payload.as_bytes(), &public);

    Ok(ChallengeResponse {
        signature,
        timestamp,
    })
}

/// Issues short-lived challenges and verifies signed responses against the
/// registered authority keys.
///
/// Verification failures deliberately collapse to `Ok(false)`: the caller
/// learns that authentication failed, not which check failed. Only an
/// unregistered authority id is an error.
pub struct ChallengeIssuer {
    expiry: Duration,
    challenges: HashMap<AuthorityId, Challenge>,
}

impl Default for ChallengeIssuer {
    fn default() -> Self {
        ChallengeIssuer::new()
    }
}

impl ChallengeIssuer {
    pub fn new() -> Self {
        ChallengeIssuer::with_expiry(CHALLENGE_EXPIRY_SECONDS)
    }

    pub fn with_expiry(seconds: i64) -> Self {
        ChallengeIssuer {
            expiry: Duration::seconds(seconds),
            challenges: HashMap::new(),
        }
    }

    /// Issue a fresh challenge for an authority, replacing any outstanding
    /// one. The nonce is 32 random bytes, hex-encoded.
    pub fn issue(
        &mut self,
        roster: &AuthorityRoster,
        authority_id: AuthorityId,
        now: DateTime<Utc>,
    ) -> Result<Challenge, Error> {
        roster.require(authority_id)?;

        let mut nonce_bytes = [0u8; 32];
        rand::rngs::OsRng {}.fill_bytes(&mut nonce_bytes);

        let challenge = Challenge {
            nonce: hex::encode(nonce_bytes),
            authority_id,
            issued_at: now,
            expires_at: now + self.expiry,
            state: ChallengeState::Issued,
        };
        self.challenges.insert(authority_id, challenge.clone());

        log::debug!(
            "issued challenge for authority {} (expires in {}s)",
            authority_id,
            self.expiry.num_seconds()
        );

        Ok(challenge)
    }

    /// Verify an authentication attempt, consuming the challenge on success.
    ///
    /// A challenge authenticates exactly once: a second attempt with the
    /// same credentials returns `false` even if the signature is valid.
    /// Expiry is checked here, server-side, so an attempt that raced past
    /// the deadline is rejected regardless of what the client believed.
    pub fn verify(
        &mut self,
        roster: &AuthorityRoster,
        credentials: &AuthCredentials,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let authority = roster.require(credentials.authority_id)?;

        let challenge = match self.challenges.get_mut(&credentials.authority_id) {
            Some(challenge) => challenge,
            None => return Ok(false),
        };

        if challenge.state != ChallengeState::Issued {
            return Ok(false);
        }
        if now >= challenge.expires_at {
            challenge.state = ChallengeState::Expired;
            return Ok(false);
        }

        if !credentials_match(authority, challenge, credentials) {
            return Ok(false);
        }

        challenge.state = ChallengeState::Consumed;
        log::info!("authority {} authenticated", credentials.authority_id);
        Ok(true)
    }

    /// Check that credentials belong to a live authenticated session: the
    /// challenge they reference was consumed by a successful `verify` and
    /// its expiry window has not elapsed.
    ///
    /// Read-only, so every submission in a batch can re-prove possession of
    /// the key without burning a fresh challenge per vote.
    pub fn check_session(
        &self,
        roster: &AuthorityRoster,
        credentials: &AuthCredentials,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let authority = roster.require(credentials.authority_id)?;

        let challenge = match self.challenges.get(&credentials.authority_id) {
            Some(challenge) => challenge,
            None => return Ok(false),
        };

        if challenge.state != ChallengeState::Consumed {
            return Ok(false);
        }
        if now >= challenge.expires_at {
            return Ok(false);
        }

        Ok(credentials_match(authority, challenge, credentials))
    }

    pub fn get(&self, authority_id: AuthorityId) -> Option<&Challenge> {
        self.challenges.get(&authority_id)
    }
}

fn credentials_match(
    authority: &TrustedAuthority,
    challenge: &Challenge,
    credentials: &AuthCredentials,
) -> bool {
    if credentials.challenge != challenge.nonce {
        return false;
    }
    if credentials.public_key_fingerprint != authority.public_key_fingerprint {
        return false;
    }

    // The signed timestamp must fall inside the challenge window
    let timestamp = credentials.response.timestamp;
    if timestamp < challenge.issued_at.timestamp() || timestamp > challenge.expires_at.timestamp() {
        return false;
    }

    let payload = format!("{}:{}", challenge.nonce, timestamp);
    authority
        .public_key
        .verify_strict(payload.as_bytes(), &credentials.response.signature)
        .is_ok()
}

/// Compose issue, respond and verify into a single round trip.
pub fn authenticate(
    issuer: &mut ChallengeIssuer,
    roster: &AuthorityRoster,
    authority_id: AuthorityId,
    secret_key_bytes: &[u8],
    now: DateTime<Utc>,
) -> Result<(bool, AuthCredentials), Error> {
    let challenge = issuer.issue(roster, authority_id, now)?;
    let response = respond_to_challenge(&challenge.nonce, secret_key_bytes, now)?;

    let credentials = AuthCredentials {
        authority_id,
        challenge: challenge.nonce,
        response,
        public_key_fingerprint: roster.require(authority_id)?.public_key_fingerprint.clone(),
    };

    let valid = issuer.verify(roster, &credentials, now)?;
    Ok((valid, credentials))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (AuthorityRoster, ChallengeIssuer, SecretKey) {
        let (authority, secret) = TrustedAuthority::new(1, "auditor");
        let roster = AuthorityRoster::new(vec![authority]);
        (roster, ChallengeIssuer::new(), secret)
    }

    #[test]
    fn challenge_verifies_exactly_once() {
        let (roster, mut issuer, secret) = setup();
        let now = Utc::now();

        let (valid, credentials) =
            authenticate(&mut issuer, &roster, 1, secret.as_bytes(), now).unwrap();
        assert!(valid);

        // Replay of the consumed challenge is rejected
        assert!(!issuer.verify(&roster, &credentials, now).unwrap());

        // But the consumed challenge still backs a live session
        assert!(issuer.check_session(&roster, &credentials, now).unwrap());
    }

    #[test]
    fn expired_challenge_is_rejected_even_with_valid_signature() {
        let (roster, mut issuer, secret) = setup();
        let now = Utc::now();

        let challenge = issuer.issue(&roster, 1, now).unwrap();
        let response = respond_to_challenge(&challenge.nonce, secret.as_bytes(), now).unwrap();
        let credentials = AuthCredentials {
            authority_id: 1,
            challenge: challenge.nonce,
            response,
            public_key_fingerprint: roster.require(1).unwrap().public_key_fingerprint.clone(),
        };

        // Clock skew past the expiry window
        let late = now + Duration::seconds(CHALLENGE_EXPIRY_SECONDS + 1);
        assert!(!issuer.verify(&roster, &credentials, late).unwrap());
        assert_eq!(issuer.get(1).unwrap().state, ChallengeState::Expired);

        // No way back to `Issued`
        assert!(!issuer.verify(&roster, &credentials, now).unwrap());
    }

    #[test]
    fn wrong_key_or_fingerprint_fails_quietly() {
        let (roster, mut issuer, _secret) = setup();
        let (_, wrong_secret) = TrustedAuthority::new(2, "imposter");
        let now = Utc::now();

        let challenge = issuer.issue(&roster, 1, now).unwrap();
        let response =
            respond_to_challenge(&challenge.nonce, wrong_secret.as_bytes(), now).unwrap();
        let credentials = AuthCredentials {
            authority_id: 1,
            challenge: challenge.nonce,
            response,
            public_key_fingerprint: roster.require(1).unwrap().public_key_fingerprint.clone(),
        };

        assert!(!issuer.verify(&roster, &credentials, now).unwrap());
    }

    #[test]
    fn unknown_authority_is_an_error_not_false() {
        let (roster, mut issuer, _) = setup();
        assert!(matches!(
            issuer.issue(&roster, 99, Utc::now()),
            Err(Error::UnknownAuthority(99))
        ));
    }

    #[test]
    fn session_expires_hard() {
        let (roster, mut issuer, secret) = setup();
        let now = Utc::now();

        let (valid, credentials) =
            authenticate(&mut issuer, &roster, 1, secret.as_bytes(), now).unwrap();
        assert!(valid);

        let late = now + Duration::seconds(CHALLENGE_EXPIRY_SECONDS + 1);
        assert!(!issuer.check_session(&roster, &credentials, late).unwrap());
    }
}
