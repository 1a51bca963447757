use serde::{Deserialize, Serialize};

use crate::model::{common::CandidateId, db::Candidate};

/// A candidate as shown on the ballot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateDesc {
    pub candidate_id: CandidateId,
    pub display_name: String,
    pub localized_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    /// Absent unless the viewer may see counts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vote_count: Option<u64>,
}

impl CandidateDesc {
    pub fn new(candidate: Candidate, show_count: bool) -> Self {
        Self {
            vote_count: show_count.then_some(candidate.vote_count),
            candidate_id: candidate.candidate_id,
            display_name: candidate.display_name,
            localized_name: candidate.localized_name,
            image_ref: candidate.image_ref,
        }
    }
}
