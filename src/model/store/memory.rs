use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::model::{
    common::{CandidateId, Rejection, VoterId},
    db::{Candidate, Roster, Voter},
};

use super::{
    sort_for_ballot, CandidateFilter, CastOutcome, StoreError, StoreResult, TallySnapshot,
    VoteStore,
};

/// A voter record whose only mutable field is an atomic flag.
#[derive(Debug)]
struct VoterSlot {
    voter_id: VoterId,
    name: String,
    is_admin: bool,
    has_voted: AtomicBool,
}

impl VoterSlot {
    fn load(&self) -> Voter {
        Voter {
            voter_id: self.voter_id.clone(),
            name: self.name.clone(),
            is_admin: self.is_admin,
            has_voted: self.has_voted.load(Ordering::Acquire),
        }
    }
}

impl From<&Voter> for VoterSlot {
    fn from(voter: &Voter) -> Self {
        Self {
            voter_id: voter.voter_id.clone(),
            name: voter.name.clone(),
            is_admin: voter.is_admin,
            has_voted: AtomicBool::new(voter.has_voted),
        }
    }
}

/// A candidate record whose only mutable field is an atomic counter.
#[derive(Debug)]
struct CandidateSlot {
    candidate: Candidate,
    vote_count: AtomicU64,
}

impl CandidateSlot {
    fn load(&self) -> Candidate {
        Candidate {
            vote_count: self.vote_count.load(Ordering::Acquire),
            ..self.candidate.clone()
        }
    }
}

impl From<&Candidate> for CandidateSlot {
    fn from(candidate: &Candidate) -> Self {
        Self {
            candidate: candidate.clone(),
            vote_count: AtomicU64::new(candidate.vote_count),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    voters: RwLock<HashMap<VoterId, VoterSlot>>,
    candidates: RwLock<HashMap<CandidateId, CandidateSlot>>,
}

/// A vote store living entirely in process memory.
///
/// Casting holds both maps shared, so ballots from different voters proceed in
/// parallel: each voter's flag is flipped by compare-and-swap and each
/// candidate's counter by an atomic add. Snapshots and roster loading hold the
/// voter map exclusively. Lock order is always voters, then candidates.
///
/// Cloning gives another handle onto the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding exactly the given roster.
    pub fn from_roster(roster: &Roster) -> StoreResult<Self> {
        let store = Self::new();
        store.insert_roster(roster)?;
        Ok(store)
    }

    fn voter_map(&self) -> StoreResult<RwLockReadGuard<'_, HashMap<VoterId, VoterSlot>>> {
        self.inner.voters.read().map_err(|_| StoreError::Poisoned)
    }

    fn voter_map_mut(&self) -> StoreResult<RwLockWriteGuard<'_, HashMap<VoterId, VoterSlot>>> {
        self.inner.voters.write().map_err(|_| StoreError::Poisoned)
    }

    fn candidate_map(
        &self,
    ) -> StoreResult<RwLockReadGuard<'_, HashMap<CandidateId, CandidateSlot>>> {
        self.inner.candidates.read().map_err(|_| StoreError::Poisoned)
    }

    fn candidate_map_mut(
        &self,
    ) -> StoreResult<RwLockWriteGuard<'_, HashMap<CandidateId, CandidateSlot>>> {
        self.inner.candidates.write().map_err(|_| StoreError::Poisoned)
    }

    fn insert_roster(&self, roster: &Roster) -> StoreResult<()> {
        let mut voters = self.voter_map_mut()?;
        let mut candidates = self.candidate_map_mut()?;
        for voter in &roster.voters {
            voters
                .entry(voter.voter_id.clone())
                .or_insert_with(|| VoterSlot::from(voter));
        }
        for candidate in &roster.candidates {
            candidates
                .entry(candidate.candidate_id.clone())
                .or_insert_with(|| CandidateSlot::from(candidate));
        }
        Ok(())
    }

    /// The whole compound update happens without an `await`, so a caller that
    /// gives up on the future can never observe it half done.
    fn cast_now(&self, voter_id: &VoterId, candidate_id: &CandidateId) -> StoreResult<CastOutcome> {
        let voters = self.voter_map()?;
        let candidates = self.candidate_map()?;

        let Some(voter) = voters.get(voter_id) else {
            return Ok(CastOutcome::Rejected(Rejection::UnknownVoter));
        };
        if voter.has_voted.load(Ordering::Acquire) {
            return Ok(CastOutcome::Rejected(Rejection::AlreadyVoted));
        }
        let Some(candidate) = candidates.get(candidate_id) else {
            return Ok(CastOutcome::Rejected(Rejection::UnknownCandidate));
        };

        // Only one caller can win the flip; everyone else lost the race.
        if voter
            .has_voted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(CastOutcome::Rejected(Rejection::AlreadyVoted));
        }
        candidate.vote_count.fetch_add(1, Ordering::AcqRel);
        Ok(CastOutcome::Accepted)
    }
}

#[rocket::async_trait]
impl VoteStore for MemoryStore {
    async fn voter(&self, voter_id: &VoterId) -> StoreResult<Option<Voter>> {
        Ok(self.voter_map()?.get(voter_id).map(VoterSlot::load))
    }

    async fn candidates(&self, filter: &CandidateFilter) -> StoreResult<Vec<Candidate>> {
        let mut list: Vec<_> = self
            .candidate_map()?
            .values()
            .map(CandidateSlot::load)
            .filter(|c| filter.matches(c))
            .collect();
        sort_for_ballot(&mut list);
        Ok(list)
    }

    async fn cast_vote(
        &self,
        voter_id: &VoterId,
        candidate_id: &CandidateId,
    ) -> StoreResult<CastOutcome> {
        self.cast_now(voter_id, candidate_id)
    }

    async fn snapshot(&self) -> StoreResult<TallySnapshot> {
        // Exclusive access to the voters shuts out every in-flight cast.
        let voters = self.voter_map_mut()?;
        let candidates = self.candidate_map()?;

        let voters_voted = voters
            .values()
            .filter(|v| v.has_voted.load(Ordering::Acquire))
            .count() as u64;
        let mut list: Vec<_> = candidates.values().map(CandidateSlot::load).collect();
        sort_for_ballot(&mut list);

        Ok(TallySnapshot {
            candidates: list,
            registered_voters: voters.len() as u64,
            voters_voted,
        })
    }

    async fn load_roster(&self, roster: &Roster) -> StoreResult<()> {
        self.insert_roster(roster)
    }
}
