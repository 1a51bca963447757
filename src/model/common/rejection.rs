use serde::{Deserialize, Serialize};

/// Business-rule reasons a ballot can be refused. None of these are worth retrying.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    VotingNotActive,
    UnknownVoter,
    AlreadyVoted,
    UnknownCandidate,
}

impl Rejection {
    /// Machine-readable kind, as used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::VotingNotActive => "voting_not_active",
            Self::UnknownVoter => "unknown_voter",
            Self::AlreadyVoted => "already_voted",
            Self::UnknownCandidate => "unknown_candidate",
        }
    }

    /// Human-readable reason shown to the voter.
    pub fn message(&self) -> &'static str {
        match self {
            Self::VotingNotActive => "Voting is not currently active",
            Self::UnknownVoter => "Invalid Voter ID. Please check and try again.",
            Self::AlreadyVoted => "You have already cast your vote",
            Self::UnknownCandidate => "That candidate is not on the ballot",
        }
    }
}
