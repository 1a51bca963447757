use std::collections::HashSet;
use std::path::Path;

use rocket::serde::json::serde_json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::common::{CandidateId, VoterId};

use super::{Candidate, Voter};

#[derive(Debug, Error)]
pub enum RosterError {
    #[error("Failed to read roster file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed roster: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Voter ID {0} appears more than once in the roster")]
    DuplicateVoter(VoterId),
    #[error("Candidate ID {0} appears more than once in the roster")]
    DuplicateCandidate(CandidateId),
    #[error("Roster records {votes} votes but {voted} voters who have voted")]
    InconsistentTally { votes: u64, voted: u64 },
}

/// The voters and candidates provisioned for the election.
///
/// Producing a roster is someone else's job; the backend only loads it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    #[serde(default)]
    pub voters: Vec<Voter>,
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl Roster {
    /// Load and validate a JSON roster.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RosterError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, RosterError> {
        let roster: Self = serde_json::from_str(raw)?;
        roster.validate()?;
        Ok(roster)
    }

    /// Check identifiers are unique and any pre-existing tallies add up.
    pub fn validate(&self) -> Result<(), RosterError> {
        let mut voter_ids = HashSet::new();
        for voter in &self.voters {
            if !voter_ids.insert(&voter.voter_id) {
                return Err(RosterError::DuplicateVoter(voter.voter_id.clone()));
            }
        }
        let mut candidate_ids = HashSet::new();
        for candidate in &self.candidates {
            if !candidate_ids.insert(&candidate.candidate_id) {
                return Err(RosterError::DuplicateCandidate(
                    candidate.candidate_id.clone(),
                ));
            }
        }

        let votes: u64 = self.candidates.iter().map(|c| c.vote_count).sum();
        let voted = self.voters.iter().filter(|v| v.has_voted).count() as u64;
        if votes != voted {
            return Err(RosterError::InconsistentTally { votes, voted });
        }
        Ok(())
    }
}
