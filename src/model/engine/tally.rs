//! Ranking of candidates by votes received.
//!
//! Ties are broken by display name, then by candidate ID, so the same counts
//! always give the same order and the same winner.

use std::cmp::Ordering;

use serde::Serialize;

use crate::model::db::Candidate;

/// A candidate's position in the results. Candidates with equal counts share a
/// rank, and the next rank skips accordingly (1, 1, 3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub rank: u32,
    pub candidate: Candidate,
}

fn by_result(a: &Candidate, b: &Candidate) -> Ordering {
    b.vote_count
        .cmp(&a.vote_count)
        .then_with(|| a.display_name.cmp(&b.display_name))
        .then_with(|| a.candidate_id.cmp(&b.candidate_id))
}

/// Order candidates by vote count, highest first.
pub fn rank(mut candidates: Vec<Candidate>) -> Vec<Standing> {
    candidates.sort_by(by_result);

    let mut standings: Vec<Standing> = Vec::with_capacity(candidates.len());
    for (position, candidate) in candidates.into_iter().enumerate() {
        let rank = match standings.last() {
            Some(prev) if prev.candidate.vote_count == candidate.vote_count => prev.rank,
            _ => position as u32 + 1,
        };
        standings.push(Standing { rank, candidate });
    }
    standings
}
