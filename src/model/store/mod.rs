//! The transactional store holding voters and candidates.
//!
//! Everything that writes `has_voted` or `vote_count` goes through
//! [`VoteStore::cast_vote`]; there is no other mutation path.

use std::time::Duration as StdDuration;

use mongodb::error::Error as DbError;
use thiserror::Error;

use crate::model::{
    common::{CandidateId, Rejection, VoterId},
    db::{Candidate, Roster, Voter},
};

mod memory;
pub use memory::MemoryStore;

mod mongo;
pub use mongo::{ensure_indexes_exist, Coll, MongoCollection, MongoStore};

pub type StoreResult<T> = Result<T, StoreError>;

/// Infrastructure failures. All of these are transient from the caller's point
/// of view: no partial state is left behind and the operation may be retried.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("in-memory store lock was poisoned")]
    Poisoned,
    #[error("store did not answer within {0:?}")]
    Timeout(StdDuration),
    #[error("gave up after {0} conflicting transaction attempts")]
    Contention(u32),
}

/// Result of the atomic cast procedure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CastOutcome {
    /// The voter is now marked as voted and the candidate gained one vote.
    Accepted,
    /// Nothing was changed.
    Rejected(Rejection),
}

/// Narrow the candidate list by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    /// Case-insensitive substring of either the display or the localized name.
    pub name: Option<String>,
}

impl CandidateFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }

    pub fn matches(&self, candidate: &Candidate) -> bool {
        match &self.name {
            None => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                candidate.display_name.to_lowercase().contains(&needle)
                    || candidate.localized_name.to_lowercase().contains(&needle)
            }
        }
    }
}

/// A consistent read of the whole tally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallySnapshot {
    /// Sorted by display name.
    pub candidates: Vec<Candidate>,
    pub registered_voters: u64,
    pub voters_voted: u64,
}

impl TallySnapshot {
    pub fn votes_cast(&self) -> u64 {
        self.candidates.iter().map(|c| c.vote_count).sum()
    }
}

/// Ballot order: display name, then ID so equal names still sort stably.
pub(crate) fn sort_for_ballot(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.display_name
            .cmp(&b.display_name)
            .then_with(|| a.candidate_id.cmp(&b.candidate_id))
    });
}

#[rocket::async_trait]
pub trait VoteStore: Send + Sync {
    /// Fetch a single voter by exact ID. Absent and ambiguous both yield `None`.
    async fn voter(&self, voter_id: &VoterId) -> StoreResult<Option<Voter>>;

    /// Candidates matching `filter`, ordered by display name.
    async fn candidates(&self, filter: &CandidateFilter) -> StoreResult<Vec<Candidate>>;

    /// Atomically check eligibility, mark the voter as voted and count the vote.
    ///
    /// Checks run in order: voter exists, voter has not voted, candidate exists.
    /// The has-voted check is repeated at commit so that of any number of
    /// concurrent calls for one voter, exactly one is accepted.
    async fn cast_vote(
        &self,
        voter_id: &VoterId,
        candidate_id: &CandidateId,
    ) -> StoreResult<CastOutcome>;

    /// Read all candidates and the voter counts as of a single instant.
    async fn snapshot(&self) -> StoreResult<TallySnapshot>;

    /// Make sure everyone on the roster exists. Existing records keep their
    /// voting state.
    async fn load_roster(&self, roster: &Roster) -> StoreResult<()>;
}
