//! The voting session engine.
//!
//! Every client-facing operation goes through [`ElectionEngine`], which resolves
//! the phase against its clock before deciding what the caller may see or do.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use rocket::tokio::time::timeout;

use crate::error::{Error, Result};
use crate::model::{
    clock::Clock,
    common::{CandidateId, ElectionWindow, PhaseStatus, Rejection, VoterId},
    db::{Candidate, Voter},
    store::{CandidateFilter, CastOutcome, StoreError, StoreResult, TallySnapshot, VoteStore},
};

pub mod tally;

pub use tally::Standing;

/// An accepted ballot. Only exists once the store has committed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ballot {
    pub voter_id: VoterId,
    pub candidate_id: CandidateId,
    pub cast_at: DateTime<Utc>,
}

/// Candidates as a particular viewer may see them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub status: PhaseStatus,
    /// Sorted by display name.
    pub candidates: Vec<Candidate>,
    /// Whether `vote_count` may be shown to this viewer.
    pub counts_visible: bool,
}

/// Ranked results as of one consistent snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Results {
    pub status: PhaseStatus,
    pub standings: Vec<Standing>,
    pub total_votes: u64,
}

impl Results {
    /// Results stop changing once voting has closed.
    pub fn is_final(&self) -> bool {
        self.status.is_ended()
    }

    /// The first standing. [`tally::rank`] has already broken any tie.
    pub fn winner(&self) -> Option<&Candidate> {
        self.standings.first().map(|s| &s.candidate)
    }
}

/// Participation figures for the admin panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turnout {
    pub status: PhaseStatus,
    pub registered_voters: u64,
    pub voters_voted: u64,
    pub votes_cast: u64,
}

#[derive(Clone)]
pub struct ElectionEngine {
    window: ElectionWindow,
    store: Arc<dyn VoteStore>,
    clock: Arc<dyn Clock>,
    store_timeout: StdDuration,
}

impl ElectionEngine {
    pub fn new(
        window: ElectionWindow,
        store: Arc<dyn VoteStore>,
        clock: Arc<dyn Clock>,
        store_timeout: StdDuration,
    ) -> Self {
        Self {
            window,
            store,
            clock,
            store_timeout,
        }
    }

    pub fn window(&self) -> &ElectionWindow {
        &self.window
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// The phase right now.
    pub fn phase(&self) -> PhaseStatus {
        self.window.resolve(self.now())
    }

    /// Run a store call, bounding how long it may take.
    ///
    /// A call that runs out of time is dropped. Stores never leave a cast half
    /// applied when that happens.
    async fn store_call<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = StoreResult<T>> + Send,
    {
        let result = match timeout(self.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.store_timeout)),
        };
        result.map_err(|err| {
            error!("Store failure: {err}");
            Error::from(err)
        })
    }

    /// Resolve a login attempt to a voter record.
    ///
    /// Blank input fails validation without touching the store.
    pub async fn authenticate(&self, raw_voter_id: &str) -> Result<Voter> {
        let voter_id = VoterId::parse(raw_voter_id)?;
        match self.voter(&voter_id).await? {
            Some(voter) => {
                info!("Voter {voter_id} authenticated");
                Ok(voter)
            }
            None => {
                debug!("Login refused for unknown voter ID {voter_id}");
                Err(Rejection::UnknownVoter.into())
            }
        }
    }

    /// Fresh voter state, straight from the store.
    pub async fn voter(&self, voter_id: &VoterId) -> Result<Option<Voter>> {
        self.store_call(self.store.voter(voter_id)).await
    }

    /// Whether `viewer` may see per-candidate counts during `status`.
    fn counts_visible(status: &PhaseStatus, viewer: Option<&Voter>) -> bool {
        status.is_ended() || viewer.map_or(false, |v| v.is_admin)
    }

    pub async fn candidates(
        &self,
        filter: &CandidateFilter,
        viewer: Option<&Voter>,
    ) -> Result<Listing> {
        let status = self.phase();
        let candidates = self.store_call(self.store.candidates(filter)).await?;
        Ok(Listing {
            counts_visible: Self::counts_visible(&status, viewer),
            status,
            candidates,
        })
    }

    /// Cast a ballot at the current instant.
    pub async fn cast_vote(
        &self,
        voter_id: &VoterId,
        candidate_id: &CandidateId,
    ) -> Result<Ballot> {
        self.cast_vote_at(voter_id, candidate_id, self.now()).await
    }

    /// Cast a ballot for a candidate ID as the client typed it.
    ///
    /// Outside the voting window this refuses before looking at the input, so
    /// a blank choice after closing is still `VotingNotActive`.
    pub async fn cast_ballot(
        &self,
        voter_id: &VoterId,
        raw_candidate_id: &str,
    ) -> Result<Ballot> {
        let now = self.now();
        if !self.window.resolve(now).is_active() {
            debug!("Ballot from {voter_id} refused: voting is not active");
            return Err(Rejection::VotingNotActive.into());
        }
        let candidate_id = CandidateId::parse(raw_candidate_id)?;
        self.cast_vote_at(voter_id, &candidate_id, now).await
    }

    /// Cast a ballot as of `now`.
    ///
    /// The phase is checked here; the remaining checks and the compound update
    /// happen atomically inside the store.
    pub async fn cast_vote_at(
        &self,
        voter_id: &VoterId,
        candidate_id: &CandidateId,
        now: DateTime<Utc>,
    ) -> Result<Ballot> {
        if !self.window.resolve(now).is_active() {
            debug!("Ballot from {voter_id} refused: voting is not active");
            return Err(Rejection::VotingNotActive.into());
        }

        let outcome = self
            .store_call(self.store.cast_vote(voter_id, candidate_id))
            .await?;
        match outcome {
            CastOutcome::Accepted => {
                info!("Ballot accepted from voter {voter_id}");
                Ok(Ballot {
                    voter_id: voter_id.clone(),
                    candidate_id: candidate_id.clone(),
                    cast_at: now,
                })
            }
            CastOutcome::Rejected(rejection) => {
                debug!("Ballot from {voter_id} refused: {}", rejection.kind());
                Err(rejection.into())
            }
        }
    }

    async fn snapshot(&self) -> Result<TallySnapshot> {
        self.store_call(self.store.snapshot()).await
    }

    /// Ranked results. Public once voting has ended; before that only admins
    /// may see them, and they are provisional.
    pub async fn results(&self, viewer: Option<&Voter>) -> Result<Results> {
        let status = self.phase();
        if !Self::counts_visible(&status, viewer) {
            return Err(Error::Forbidden(
                "Results are published once voting has closed".to_string(),
            ));
        }

        let snapshot = self.snapshot().await?;
        let total_votes = snapshot.votes_cast();
        Ok(Results {
            status,
            standings: tally::rank(snapshot.candidates),
            total_votes,
        })
    }

    /// The leading candidate, under the same visibility rules as [`Self::results`].
    pub async fn winner(&self, viewer: Option<&Voter>) -> Result<Option<Candidate>> {
        let results = self.results(viewer).await?;
        Ok(results.winner().cloned())
    }

    /// Callers must already have checked that the viewer is an admin.
    pub async fn turnout(&self) -> Result<Turnout> {
        let status = self.phase();
        let snapshot = self.snapshot().await?;
        Ok(Turnout {
            status,
            registered_voters: snapshot.registered_voters,
            voters_voted: snapshot.voters_voted,
            votes_cast: snapshot.votes_cast(),
        })
    }
}
