use serde::{Deserialize, Serialize};

use crate::model::{common::VoterId, db::Voter};

/// A voter as shown to themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoterDesc {
    pub voter_id: VoterId,
    pub name: String,
    pub is_admin: bool,
    /// Advisory; the store decides whether a ballot is accepted.
    pub has_voted: bool,
}

impl From<Voter> for VoterDesc {
    fn from(voter: Voter) -> Self {
        Self {
            voter_id: voter.voter_id,
            name: voter.name,
            is_admin: voter.is_admin,
            has_voted: voter.has_voted,
        }
    }
}
