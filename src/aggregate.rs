use crate::*;
use curve25519_dalek::ristretto::RistrettoPoint;
use indexmap::IndexMap;
use std::collections::BTreeSet;

/// Per-election progress of one decryption round.
///
/// `Decrypted` is terminal: starting over requires an explicit
/// `begin_new_round`, never an automatic transition.
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AggregationState {
    Collecting,
    ThresholdMet,
    Decrypted,
}

#[derive(Serialize, Deserialize, Clone)]
pub struct AggregationSession {
    pub election_id: ElectionId,
    pub threshold: usize,
    pub state: AggregationState,
    authorities: BTreeSet<AuthorityId>,
}

impl AggregationSession {
    pub fn new(election_id: ElectionId, threshold: usize) -> Self {
        AggregationSession {
            election_id,
            threshold,
            state: AggregationState::Collecting,
            authorities: BTreeSet::new(),
        }
    }

    /// Record that an authority has contributed. Keyed by identity, so a
    /// resubmitting authority never counts twice.
    pub fn record_authority(&mut self, authority_id: AuthorityId) -> Result<AggregationState, Error> {
        if self.state == AggregationState::Decrypted {
            return Err(Error::AlreadyDecrypted(self.election_id));
        }
        self.authorities.insert(authority_id);
        if self.authorities.len() >= self.threshold {
            self.state = AggregationState::ThresholdMet;
        }
        Ok(self.state)
    }

    pub fn submitted(&self) -> usize {
        self.authorities.len()
    }

    /// Fraction of the threshold reached, for progress display.
    pub fn progress(&self) -> f64 {
        self.authorities.len() as f64 / self.threshold as f64
    }

    pub fn threshold_met(&self) -> bool {
        self.authorities.len() >= self.threshold
    }

    pub fn mark_decrypted(&mut self) {
        self.state = AggregationState::Decrypted;
    }

    /// Start a fresh decryption round. This is the one explicit way out of
    /// the terminal `Decrypted` state.
    pub fn begin_new_round(&mut self) {
        self.state = AggregationState::Collecting;
        self.authorities.clear();
    }
}

/// One authority's batch of partial decryptions, as handed to the
/// aggregation endpoint: vote id mapped to the contributed value.
#[derive(Clone)]
pub struct AuthorityContribution {
    pub authority_id: AuthorityId,
    pub votes: IndexMap<VoteId, RistrettoPoint>,
}

/// Decrypted tallies for one position.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PositionResult {
    pub position_id: PositionId,
    pub candidate_results: IndexMap<CandidateId, u64>,
}

/// The outcome of one decryption run. `failed_votes` lists votes that could
/// not be resolved (not enough contributions, or an undecodable plaintext)
/// while the run as a whole still succeeded.
#[derive(Clone, Debug)]
pub struct DecryptionOutcome {
    pub results: Vec<PositionResult>,
    pub resolved: usize,
    pub failed_votes: Vec<VoteId>,
}

/// Combine at least `threshold` authorities' partial decryptions into
/// per-position candidate tallies.
///
/// Contributions are deduplicated by authority identity before the
/// threshold check. Each vote may be resolved by a different t-subset; the
/// combination is order-independent. If no vote at all resolves, the whole
/// call fails.
pub fn decrypt_election_results(
    meta: &CryptoMeta,
    votes: &VoteStore,
    contributions: &[AuthorityContribution],
    max_candidate: CandidateId,
) -> Result<DecryptionOutcome, Error> {
    // Dedup by authority id; a duplicated contribution never double-counts
    let mut by_authority: IndexMap<AuthorityId, &AuthorityContribution> = IndexMap::new();
    for contribution in contributions {
        by_authority.entry(contribution.authority_id).or_insert(contribution);
    }

    if by_authority.len() < meta.threshold {
        return Err(Error::InsufficientShares {
            threshold: meta.threshold,
            submitted: by_authority.len(),
            needed: meta.threshold - by_authority.len(),
        });
    }

    let mut tallies: IndexMap<PositionId, IndexMap<CandidateId, u64>> = IndexMap::new();
    let mut resolved = 0usize;
    let mut failed_votes = Vec::new();

    for vote in votes.iter() {
        let partials: Vec<(AuthorityId, RistrettoPoint)> = by_authority
            .values()
            .filter_map(|c| c.votes.get(&vote.id).map(|value| (c.authority_id, *value)))
            .collect();

        if partials.len() < meta.threshold {
            log::warn!(
                "vote {} has {} of {} required contributions; skipping",
                vote.id,
                partials.len(),
                meta.threshold
            );
            failed_votes.push(vote.id);
            continue;
        }

        let plaintext = combine_partials(&vote.ciphertext, &partials);
        match decode_plaintext(&plaintext, max_candidate) {
            Ok(candidate) => {
                *tallies
                    .entry(vote.position_id)
                    .or_insert_with(IndexMap::new)
                    .entry(candidate)
                    .or_insert(0) += 1;
                resolved += 1;
            }
            Err(_) => {
                log::warn!("vote {} decrypted outside the candidate domain; skipping", vote.id);
                failed_votes.push(vote.id);
            }
        }
    }

    if resolved == 0 {
        return Err(Error::NoVotesResolved);
    }

    let results = tallies
        .into_iter()
        .map(|(position_id, candidate_results)| PositionResult {
            position_id,
            candidate_results,
        })
        .collect();

    Ok(DecryptionOutcome {
        results,
        resolved,
        failed_votes,
    })
}

/// Build per-authority contributions out of the submission ledger, for a
/// decryption run over everything submitted so far.
pub fn contributions_from_ledger(ledger: &SubmissionLedger, votes: &VoteStore) -> Vec<AuthorityContribution> {
    let mut grouped: IndexMap<AuthorityId, IndexMap<VoteId, RistrettoPoint>> = IndexMap::new();
    for vote in votes.iter() {
        for record in ledger.partials_for_vote(vote.id) {
            grouped
                .entry(record.authority_id)
                .or_insert_with(IndexMap::new)
                .insert(record.vote_id, record.value);
        }
    }

    grouped
        .into_iter()
        .map(|(authority_id, votes)| AuthorityContribution { authority_id, votes })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        meta: CryptoMeta,
        shares: Vec<KeyShare>,
        votes: VoteStore,
    }

    /// threshold=3, totalShares=5, a handful of votes across two positions
    fn fixture() -> Fixture {
        let mut rng = rand::rngs::OsRng {};
        let meta = CryptoMeta::new(3, 5).unwrap();
        let (master, public_key) = generate_master_key(&mut rng);
        let shares = deal_shares(&master, &meta, &mut rng).unwrap();

        let plaintexts: [(VoteId, PositionId, CandidateId); 5] =
            [(1, 1, 2), (2, 1, 2), (3, 1, 3), (4, 2, 1), (5, 2, 1)];

        let mut votes = VoteStore::default();
        for (id, position_id, candidate) in plaintexts.iter() {
            votes.insert(EncryptedVote {
                id: *id,
                election_id: 1,
                position_id: *position_id,
                ciphertext: encrypt(&public_key, *candidate, &mut rng),
            });
        }

        Fixture { meta, shares, votes }
    }

    fn contribution(share: &KeyShare, votes: &VoteStore) -> AuthorityContribution {
        let votes = votes
            .iter()
            .map(|v| (v.id, partial_decrypt(share, &v.ciphertext)))
            .collect();
        AuthorityContribution {
            authority_id: share.authority_id,
            votes,
        }
    }

    #[test]
    fn below_threshold_reports_how_many_more_are_needed() {
        let f = fixture();
        let contributions: Vec<_> =
            f.shares[..2].iter().map(|s| contribution(s, &f.votes)).collect();

        match decrypt_election_results(&f.meta, &f.votes, &contributions, 50) {
            Err(Error::InsufficientShares { needed, submitted, threshold }) => {
                assert_eq!(needed, 1);
                assert_eq!(submitted, 2);
                assert_eq!(threshold, 3);
            }
            other => panic!("expected InsufficientShares, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn at_threshold_tallies_sum_to_vote_counts() {
        let f = fixture();
        let contributions: Vec<_> =
            f.shares[..3].iter().map(|s| contribution(s, &f.votes)).collect();

        let outcome = decrypt_election_results(&f.meta, &f.votes, &contributions, 50).unwrap();
        assert_eq!(outcome.resolved, 5);
        assert!(outcome.failed_votes.is_empty());

        let position_1 = outcome.results.iter().find(|r| r.position_id == 1).unwrap();
        assert_eq!(position_1.candidate_results[&2], 2);
        assert_eq!(position_1.candidate_results[&3], 1);
        assert_eq!(position_1.candidate_results.values().sum::<u64>(), 3);

        let position_2 = outcome.results.iter().find(|r| r.position_id == 2).unwrap();
        assert_eq!(position_2.candidate_results[&1], 2);
    }

    #[test]
    fn any_t_subset_yields_identical_tallies() {
        let f = fixture();
        let tally = |indexes: &[usize]| {
            let contributions: Vec<_> = indexes
                .iter()
                .map(|&i| contribution(&f.shares[i], &f.votes))
                .collect();
            let mut outcome =
                decrypt_election_results(&f.meta, &f.votes, &contributions, 50).unwrap();
            outcome.results.sort_by_key(|r| r.position_id);
            outcome
        };

        let first = tally(&[0, 1, 2]);
        let second = tally(&[2, 3, 4]);
        assert_eq!(first.resolved, second.resolved);
        for (a, b) in first.results.iter().zip(second.results.iter()) {
            assert_eq!(a.position_id, b.position_id);
            assert_eq!(a.candidate_results, b.candidate_results);
        }
    }

    #[test]
    fn duplicated_contribution_does_not_reach_threshold() {
        let f = fixture();
        let mut contributions: Vec<_> =
            f.shares[..2].iter().map(|s| contribution(s, &f.votes)).collect();
        // Same authority submitted twice
        contributions.push(contribution(&f.shares[1], &f.votes));

        assert!(matches!(
            decrypt_election_results(&f.meta, &f.votes, &contributions, 50),
            Err(Error::InsufficientShares { needed: 1, .. })
        ));
    }

    #[test]
    fn vote_without_full_coverage_is_a_per_vote_failure() {
        let f = fixture();
        let mut contributions: Vec<_> =
            f.shares[..3].iter().map(|s| contribution(s, &f.votes)).collect();
        // Authority 3 never got around to vote 5
        contributions[2].votes.remove(&5);

        let outcome = decrypt_election_results(&f.meta, &f.votes, &contributions, 50).unwrap();
        assert_eq!(outcome.resolved, 4);
        assert_eq!(outcome.failed_votes, vec![5]);
    }

    #[test]
    fn no_resolvable_votes_fails_outright() {
        let f = fixture();
        let contributions: Vec<_> = f.shares[..3]
            .iter()
            .map(|s| {
                let mut c = contribution(s, &f.votes);
                c.votes.clear();
                c
            })
            .collect();

        assert!(matches!(
            decrypt_election_results(&f.meta, &f.votes, &contributions, 50),
            Err(Error::NoVotesResolved)
        ));
    }

    #[test]
    fn session_state_machine() {
        let mut session = AggregationSession::new(1, 3);
        assert_eq!(session.state, AggregationState::Collecting);

        session.record_authority(1).unwrap();
        session.record_authority(1).unwrap(); // resubmission, not double counted
        session.record_authority(2).unwrap();
        assert_eq!(session.submitted(), 2);
        assert_eq!(session.state, AggregationState::Collecting);

        session.record_authority(4).unwrap();
        assert_eq!(session.state, AggregationState::ThresholdMet);
        assert!((session.progress() - 1.0).abs() < f64::EPSILON);

        session.mark_decrypted();
        assert!(matches!(
            session.record_authority(5),
            Err(Error::AlreadyDecrypted(1))
        ));

        session.begin_new_round();
        assert_eq!(session.state, AggregationState::Collecting);
        assert_eq!(session.submitted(), 0);
    }
}
