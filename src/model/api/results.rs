use serde::{Deserialize, Serialize};

use crate::model::{
    common::Phase,
    engine::{Results, Standing, Turnout},
};

use super::candidate::CandidateDesc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandingDesc {
    pub rank: u32,
    pub candidate: CandidateDesc,
}

impl From<Standing> for StandingDesc {
    fn from(standing: Standing) -> Self {
        Self {
            rank: standing.rank,
            candidate: CandidateDesc::new(standing.candidate, true),
        }
    }
}

/// Ranked results, highest vote count first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResults {
    pub phase: Phase,
    /// False while voting is still open; the numbers may yet change.
    #[serde(rename = "final")]
    pub is_final: bool,
    pub total_votes: u64,
    pub standings: Vec<StandingDesc>,
    /// Absent only when there are no candidates.
    pub winner: Option<CandidateDesc>,
}

impl From<Results> for ElectionResults {
    fn from(results: Results) -> Self {
        let winner = results
            .winner()
            .map(|w| CandidateDesc::new(w.clone(), true));
        Self {
            phase: results.status.phase(),
            is_final: results.is_final(),
            total_votes: results.total_votes,
            standings: results.standings.into_iter().map(Into::into).collect(),
            winner,
        }
    }
}

/// Participation figures. `votes_cast` always equals `voters_voted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnoutDesc {
    pub phase: Phase,
    pub registered_voters: u64,
    pub voters_voted: u64,
    pub votes_cast: u64,
}

impl From<Turnout> for TurnoutDesc {
    fn from(turnout: Turnout) -> Self {
        Self {
            phase: turnout.status.phase(),
            registered_voters: turnout.registered_voters,
            voters_voted: turnout.voters_voted,
            votes_cast: turnout.votes_cast,
        }
    }
}
