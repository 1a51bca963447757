use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{common::CandidateId, engine::Ballot};

use super::voter::VoterDesc;

/// A ballot the logged-in voter wishes to cast. The ID is raw user input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BallotRequest {
    pub candidate_id: String,
}

/// Confirmation of an accepted ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastReceipt {
    pub candidate_id: CandidateId,
    pub cast_at: DateTime<Utc>,
    /// The voter's state after casting.
    pub voter: VoterDesc,
    /// Wait this long before re-reading tallies.
    pub refresh_after_ms: u64,
}

impl CastReceipt {
    pub fn new(ballot: Ballot, voter: VoterDesc, refresh_after_ms: u64) -> Self {
        Self {
            candidate_id: ballot.candidate_id,
            cast_at: ballot.cast_at,
            voter,
            refresh_after_ms,
        }
    }
}

#[cfg(test)]
mod examples {
    use super::*;

    impl BallotRequest {
        pub fn example() -> Self {
            Self {
                candidate_id: "C1".to_string(),
            }
        }
    }
}
