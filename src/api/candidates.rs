use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{auth::VoterSession, candidate::CandidateDesc},
    engine::ElectionEngine,
    store::CandidateFilter,
};

pub fn routes() -> Vec<Route> {
    routes![candidates]
}

/// The ballot, alphabetical by display name. Counts are included for admins,
/// and for everyone once voting has closed.
#[get("/candidates?<name>")]
pub async fn candidates(
    name: Option<String>,
    session: Option<VoterSession>,
    engine: &State<ElectionEngine>,
) -> Result<Json<Vec<CandidateDesc>>> {
    let filter = CandidateFilter {
        name: name.filter(|n| !n.trim().is_empty()),
    };
    let viewer = session.as_ref().map(|s| &s.voter);
    let listing = engine.candidates(&filter, viewer).await?;

    let show_counts = listing.counts_visible;
    Ok(Json(
        listing
            .candidates
            .into_iter()
            .map(|c| CandidateDesc::new(c, show_counts))
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use rocket::{http::Status, local::asynchronous::Client};

    use crate::model::{
        common::{CandidateId, VoterId},
        store::{MemoryStore, VoteStore},
    };

    use super::*;

    async fn list(client: &Client, name: Option<&str>) -> Vec<CandidateDesc> {
        let response = client.get(uri!(candidates(name))).dispatch().await;
        assert_eq!(Status::Ok, response.status());
        response.into_json().await.unwrap()
    }

    async fn vote_directly(store: &MemoryStore) {
        store
            .cast_vote(
                &VoterId::parse("B456").unwrap(),
                &CandidateId::parse("C2").unwrap(),
            )
            .await
            .unwrap();
    }

    #[backend_test(voter)]
    async fn sorted_by_display_name(client: Client) {
        let names: Vec<_> = list(&client, None)
            .await
            .into_iter()
            .map(|c| c.display_name)
            .collect();
        assert_eq!(names, vec!["Abrar", "Dishanth"]);
    }

    #[backend_test(voter)]
    async fn voters_do_not_see_counts_while_active(client: Client, store: MemoryStore) {
        vote_directly(&store).await;

        for candidate in list(&client, None).await {
            assert_eq!(candidate.vote_count, None);
        }
    }

    #[backend_test(admin)]
    async fn admins_see_live_counts(client: Client, store: MemoryStore) {
        vote_directly(&store).await;

        let counts: Vec<_> = list(&client, None)
            .await
            .into_iter()
            .map(|c| c.vote_count)
            .collect();
        assert_eq!(counts, vec![Some(0), Some(1)]);
    }

    #[backend_test(ended)]
    async fn everyone_sees_counts_once_ended(client: Client) {
        for candidate in list(&client, None).await {
            assert_eq!(candidate.vote_count, Some(0));
        }
    }

    #[backend_test]
    async fn filter_by_either_name(client: Client) {
        let found = list(&client, Some("ABR")).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].display_name, "Abrar");

        let found = list(&client, Some("ದಿಶಾಂ")).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].display_name, "Dishanth");

        assert!(list(&client, Some("zzz")).await.is_empty());
        assert_eq!(list(&client, Some(" ")).await.len(), 2);
    }
}
