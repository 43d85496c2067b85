use crate::*;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Outcome of one authority's batch submission. A single vote's failure
/// does not abort the batch, so `completed` may be less than `total`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub total: usize,
}

/// One authority's place in the workflow. The authenticated state carries
/// the credentials re-presented with every submission and the hard session
/// deadline derived from the challenge expiry.
#[derive(Clone)]
pub enum PanelState {
    Unauthenticated,
    Authenticated {
        credentials: AuthCredentials,
        expires_at: DateTime<Utc>,
    },
}

/// Drives authorities through authentication, batch submission of partial
/// decryptions, and finally aggregation, for a single election.
///
/// All state is owned here, per election; two elections decrypting at the
/// same time simply use two panels.
pub struct DecryptionPanel {
    pub election_id: ElectionId,
    pub meta: CryptoMeta,
    max_candidate: CandidateId,
    roster: AuthorityRoster,
    issuer: ChallengeIssuer,
    submitter: PartialDecryptionSubmitter,
    votes: VoteStore,
    session: AggregationSession,
    panels: BTreeMap<AuthorityId, PanelState>,
}

impl DecryptionPanel {
    /// Assemble the panel for an election. The crypto config and key shares
    /// must already exist; a missing config is a blocking error upstream
    /// (`CryptoConfigRegistry::get`), not something the panel works around.
    pub fn new(
        config: &CryptoConfig,
        roster: AuthorityRoster,
        vault: KeyShareVault,
        votes: VoteStore,
        max_candidate: CandidateId,
    ) -> Self {
        let panels = roster
            .iter()
            .map(|a| (a.id, PanelState::Unauthenticated))
            .collect();

        DecryptionPanel {
            election_id: config.election_id,
            meta: config.meta,
            max_candidate,
            roster,
            issuer: ChallengeIssuer::new(),
            submitter: PartialDecryptionSubmitter::new(vault),
            votes,
            session: AggregationSession::new(config.election_id, config.meta.threshold),
            panels,
        }
    }

    pub fn request_challenge(
        &mut self,
        authority_id: AuthorityId,
        now: DateTime<Utc>,
    ) -> Result<Challenge, Error> {
        self.issuer.issue(&self.roster, authority_id, now)
    }

    /// Verify an authority's challenge response. On success the authority
    /// holds an authenticated session until the challenge's expiry.
    pub fn verify_authority(
        &mut self,
        credentials: &AuthCredentials,
        now: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let valid = self.issuer.verify(&self.roster, credentials, now)?;

        let state = if valid {
            let expires_at = self
                .issuer
                .get(credentials.authority_id)
                .map(|c| c.expires_at)
                .unwrap_or(now);
            PanelState::Authenticated {
                credentials: credentials.clone(),
                expires_at,
            }
        } else {
            PanelState::Unauthenticated
        };
        self.panels.insert(credentials.authority_id, state);

        Ok(valid)
    }

    /// Seconds left on an authority's session countdown; zero when not
    /// authenticated.
    pub fn session_remaining(&self, authority_id: AuthorityId, now: DateTime<Utc>) -> i64 {
        match self.panels.get(&authority_id) {
            Some(PanelState::Authenticated { expires_at, .. }) => {
                (*expires_at - now).num_seconds().max(0)
            }
            _ => 0,
        }
    }

    /// Enforce the hard session timeout: any authority whose countdown has
    /// elapsed is forced back to the unauthenticated state and must
    /// re-authenticate before submitting further partials.
    pub fn tick(&mut self, now: DateTime<Utc>) {
        for (authority_id, state) in self.panels.iter_mut() {
            if let PanelState::Authenticated { expires_at, .. } = state {
                if now >= *expires_at {
                    log::info!("session for authority {} expired", authority_id);
                    *state = PanelState::Unauthenticated;
                }
            }
        }
    }

    /// Submit one partial decryption, as the submit endpoint does. The
    /// supplied ciphertext must match the stored vote; every call re-proves
    /// possession of the key via the attached credentials.
    pub fn submit_one(
        &mut self,
        vote_id: VoteId,
        ciphertext: &Ciphertext,
        key_share_id: KeyShareId,
        credentials: Option<&AuthCredentials>,
        now: DateTime<Utc>,
    ) -> Result<SubmissionReceipt, Error> {
        let vote = *self.votes.get(vote_id)?;
        if vote.ciphertext != *ciphertext {
            return Err(Error::VoteNotFound(vote_id));
        }

        let receipt = self.submitter.submit(
            &vote,
            key_share_id,
            credentials,
            &self.issuer,
            &self.roster,
            now,
        )?;

        let authority_id = self.submitter.vault.require(key_share_id)?.authority_id;
        self.session.record_authority(authority_id)?;
        Ok(receipt)
    }

    /// Submit the authenticated authority's partial decryption for every
    /// outstanding vote, sequentially. Individual failures are logged and
    /// skipped; the summary reports `completed` of `total`.
    pub fn submit_all(
        &mut self,
        authority_id: AuthorityId,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, Error> {
        self.tick(now);

        let credentials = match self.panels.get(&authority_id) {
            Some(PanelState::Authenticated { credentials, .. }) => credentials.clone(),
            _ => return Err(Error::AuthenticationRequired),
        };

        let key_share_id = self
            .submitter
            .vault
            .share_for_authority(authority_id)
            .ok_or(Error::NoShareForAuthority(authority_id))?
            .id;

        let total = self.votes.len();
        let mut completed = 0usize;

        for vote in self.votes.iter() {
            match self.submitter.submit(
                vote,
                key_share_id,
                Some(&credentials),
                &self.issuer,
                &self.roster,
                now,
            ) {
                Ok(_) => completed += 1,
                Err(e) => {
                    log::warn!(
                        "authority {} failed to submit for vote {}: {}",
                        authority_id,
                        vote.id,
                        e
                    );
                }
            }
        }

        if completed > 0 {
            self.session.record_authority(authority_id)?;
        }

        log::info!(
            "authority {} submitted {} of {} partial decryptions",
            authority_id,
            completed,
            total
        );

        Ok(BatchSummary { completed, total })
    }

    /// Progress toward the threshold, as submitted authorities over the
    /// required quorum.
    pub fn progress(&self) -> f64 {
        self.session.progress()
    }

    pub fn state(&self) -> AggregationState {
        self.session.state
    }

    /// Combine everything submitted so far into decrypted tallies. Only
    /// valid once `progress() >= 1`; finishing moves the session to its
    /// terminal state.
    pub fn decrypt(&mut self) -> Result<DecryptionOutcome, Error> {
        if self.session.state == AggregationState::Decrypted {
            return Err(Error::AlreadyDecrypted(self.election_id));
        }
        if !self.session.threshold_met() {
            return Err(Error::InsufficientShares {
                threshold: self.meta.threshold,
                submitted: self.session.submitted(),
                needed: self.meta.threshold - self.session.submitted(),
            });
        }

        let contributions = contributions_from_ledger(&self.submitter.ledger, &self.votes);
        let outcome =
            decrypt_election_results(&self.meta, &self.votes, &contributions, self.max_candidate)?;

        self.session.mark_decrypted();
        Ok(outcome)
    }

    /// Start an explicit re-decryption round.
    pub fn begin_new_round(&mut self) {
        self.session.begin_new_round();
    }

    pub fn roster(&self) -> &AuthorityRoster {
        &self.roster
    }

    pub fn votes(&self) -> &VoteStore {
        &self.votes
    }
}
