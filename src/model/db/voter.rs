use serde::{Deserialize, Serialize};

use crate::model::common::VoterId;

/// A registered voter, as stored.
///
/// Voters are provisioned before the election opens and are never deleted while
/// it runs. `has_voted` is the only field that changes, and only the ballot
/// casting procedure of a [`VoteStore`](crate::model::store::VoteStore) may flip it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voter {
    pub voter_id: VoterId,
    pub name: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub has_voted: bool,
}
