use crate::*;
use std::collections::BTreeMap;

/// An encrypted ballot component: one ciphertext bound to one position.
///
/// Produced upstream at cast time; opaque and immutable here.
#[derive(Serialize, Deserialize, Copy, Clone)]
pub struct EncryptedVote {
    pub id: VoteId,
    pub election_id: ElectionId,
    pub position_id: PositionId,
    pub ciphertext: Ciphertext,
}

/// The outstanding encrypted votes for one election.
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct VoteStore {
    votes: BTreeMap<VoteId, EncryptedVote>,
}

impl VoteStore {
    pub fn insert(&mut self, vote: EncryptedVote) {
        self.votes.insert(vote.id, vote);
    }

    pub fn get(&self, id: VoteId) -> Result<&EncryptedVote, Error> {
        self.votes.get(&id).ok_or(Error::VoteNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EncryptedVote> {
        self.votes.values()
    }
}

impl From<Vec<EncryptedVote>> for VoteStore {
    fn from(item: Vec<EncryptedVote>) -> Self {
        let mut store = VoteStore::default();
        for vote in item {
            store.insert(vote);
        }
        store
    }
}
