use serde::{Deserialize, Serialize};

use crate::model::common::CandidateId;

/// A candidate on the ballot, with their running tally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    pub candidate_id: CandidateId,
    /// Name in the election's primary script; the ballot is ordered by this.
    pub display_name: String,
    /// Name in the voters' local script.
    pub localized_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,
    /// Never decreases. Only the ballot casting procedure increments it.
    #[serde(default)]
    pub vote_count: u64,
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Candidate {
        pub fn example() -> Self {
            Self {
                candidate_id: CandidateId::parse("C1").unwrap(),
                display_name: "Abrar".to_string(),
                localized_name: "ಅಬ್ರಾರ್".to_string(),
                image_ref: Some("/images/abrar.jpg".to_string()),
                vote_count: 0,
            }
        }

        pub fn example2() -> Self {
            Self {
                candidate_id: CandidateId::parse("C2").unwrap(),
                display_name: "Dishanth".to_string(),
                localized_name: "ದಿಶಾಂತ್".to_string(),
                image_ref: None,
                vote_count: 0,
            }
        }

        pub fn with_votes(mut self, vote_count: u64) -> Self {
            self.vote_count = vote_count;
            self
        }
    }
}
