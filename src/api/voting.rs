use rocket::{serde::json::Json, Route, State};

use crate::{
    config::Config,
    error::Result,
    model::{
        api::{
            auth::VoterSession,
            ballot::{BallotRequest, CastReceipt},
            voter::VoterDesc,
        },
        engine::ElectionEngine,
    },
};

pub fn routes() -> Vec<Route> {
    routes![cast_vote]
}

#[post("/votes", data = "<ballot>", format = "json")]
pub async fn cast_vote(
    session: VoterSession,
    ballot: Json<BallotRequest>,
    engine: &State<ElectionEngine>,
    config: &State<Config>,
) -> Result<Json<CastReceipt>> {
    let mut voter = session.voter;

    let ballot = engine
        .cast_ballot(&voter.voter_id, &ballot.candidate_id)
        .await?;

    // The store flipped the flag in the same commit as the count.
    voter.has_voted = true;

    Ok(Json(CastReceipt::new(
        ballot,
        VoterDesc::from(voter),
        config.refresh_delay_ms(),
    )))
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    use chrono::Duration;
    use rocket::{
        http::{ContentType, Status},
        local::asynchronous::{Client, LocalResponse},
        serde::json::{serde_json::json, Value},
        tokio::sync::Barrier,
    };

    use crate::model::{
        api::auth::LoginRequest,
        clock::ManualClock,
        common::{CandidateId, ElectionWindow, VoterId},
        db::{Candidate, Roster, Voter},
        store::{
            CandidateFilter, CastOutcome, MemoryStore, StoreError, StoreResult, TallySnapshot,
            VoteStore,
        },
    };

    use super::*;

    async fn cast<'c>(client: &'c Client, candidate_id: &str) -> LocalResponse<'c> {
        client
            .post(uri!(cast_vote))
            .header(ContentType::JSON)
            .body(json!({ "candidate_id": candidate_id }).to_string())
            .dispatch()
            .await
    }

    fn count_for(snapshot: &TallySnapshot, candidate_id: &str) -> u64 {
        snapshot
            .candidates
            .iter()
            .find(|c| c.candidate_id.as_str() == candidate_id)
            .map(|c| c.vote_count)
            .unwrap()
    }

    #[backend_test(voter)]
    async fn cast_accepted(client: Client, store: MemoryStore, clock: ManualClock) {
        let window = ElectionWindow::example();
        clock.set(window.starts_at() + Duration::minutes(5));

        let response = cast(&client, "C1").await;

        assert_eq!(Status::Ok, response.status());
        let receipt: CastReceipt = response.into_json().await.unwrap();
        assert_eq!(receipt.candidate_id, Candidate::example().candidate_id);
        assert_eq!(receipt.cast_at, window.starts_at() + Duration::minutes(5));
        assert!(receipt.voter.has_voted);

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(count_for(&snapshot, "C1"), 1);
        assert_eq!(snapshot.voters_voted, 1);
    }

    #[backend_test(voter)]
    async fn second_cast_conflicts(client: Client, store: MemoryStore, clock: ManualClock) {
        cast(&client, "C1").await;
        clock.advance(Duration::minutes(1));

        let response = cast(&client, "C2").await;

        assert_eq!(Status::Conflict, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "already_voted");
        assert_eq!(body["message"], "You have already cast your vote");
        assert_eq!(body["retryable"], false);

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(count_for(&snapshot, "C2"), 0);
        assert_eq!(snapshot.votes_cast(), 1);
    }

    #[backend_test(voter, waiting)]
    async fn cast_before_opening(client: Client, store: MemoryStore, clock: ManualClock) {
        clock.set(ElectionWindow::example().starts_at() - Duration::seconds(1));

        let response = cast(&client, "C1").await;

        assert_eq!(Status::Forbidden, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "voting_not_active");
        assert_eq!(store.snapshot().await.unwrap().votes_cast(), 0);
    }

    #[backend_test(voter, ended)]
    async fn cast_after_closing(client: Client, store: MemoryStore, clock: ManualClock) {
        clock.set(ElectionWindow::example().ends_at());

        // Even a nonexistent candidate gets the phase rejection.
        let response = cast(&client, "C404").await;

        assert_eq!(Status::Forbidden, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "voting_not_active");

        let voter = store
            .voter(&Voter::example().voter_id)
            .await
            .unwrap()
            .unwrap();
        assert!(!voter.has_voted);
    }

    #[backend_test(voter)]
    async fn unknown_candidate(client: Client, store: MemoryStore) {
        let before = store.snapshot().await.unwrap();

        let response = cast(&client, "C404").await;

        assert_eq!(Status::NotFound, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "unknown_candidate");
        assert_eq!(store.snapshot().await.unwrap(), before);
    }

    #[backend_test(voter)]
    async fn blank_candidate_is_a_validation_error(client: Client) {
        let response = cast(&client, "  ").await;

        assert_eq!(Status::BadRequest, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["message"], "Please choose a candidate");
    }

    #[backend_test(voter, ended)]
    async fn blank_candidate_after_closing(client: Client, store: MemoryStore) {
        let response = cast(&client, "  ").await;

        assert_eq!(Status::Forbidden, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "voting_not_active");
        assert_eq!(store.snapshot().await.unwrap().votes_cast(), 0);
    }

    #[backend_test(voter, waiting)]
    async fn blank_candidate_before_opening(client: Client) {
        let response = cast(&client, "").await;

        assert_eq!(Status::Forbidden, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "voting_not_active");
    }

    #[backend_test]
    async fn cast_requires_session(client: Client, store: MemoryStore) {
        let response = cast(&client, "C1").await;

        assert_eq!(Status::Unauthorized, response.status());
        assert_eq!(store.snapshot().await.unwrap().votes_cast(), 0);
    }

    // The session is checked before the phase.
    #[backend_test(ended)]
    async fn cast_requires_session_after_closing(client: Client) {
        let response = cast(&client, "C1").await;

        assert_eq!(Status::Unauthorized, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "unauthorized");
    }

    /// Answers voter lookups until a ballot is accepted, then fails them.
    struct ReadsFailAfterCast {
        inner: MemoryStore,
        cast: AtomicBool,
    }

    #[rocket::async_trait]
    impl VoteStore for ReadsFailAfterCast {
        async fn voter(&self, voter_id: &VoterId) -> StoreResult<Option<Voter>> {
            if self.cast.load(Ordering::Acquire) {
                return Err(StoreError::Poisoned);
            }
            self.inner.voter(voter_id).await
        }

        async fn candidates(&self, filter: &CandidateFilter) -> StoreResult<Vec<Candidate>> {
            self.inner.candidates(filter).await
        }

        async fn cast_vote(
            &self,
            voter_id: &VoterId,
            candidate_id: &CandidateId,
        ) -> StoreResult<CastOutcome> {
            let outcome = self.inner.cast_vote(voter_id, candidate_id).await?;
            if outcome == CastOutcome::Accepted {
                self.cast.store(true, Ordering::Release);
            }
            Ok(outcome)
        }

        async fn snapshot(&self) -> StoreResult<TallySnapshot> {
            self.inner.snapshot().await
        }

        async fn load_roster(&self, roster: &Roster) -> StoreResult<()> {
            self.inner.load_roster(roster).await
        }
    }

    #[rocket::async_test]
    async fn receipt_does_not_depend_on_a_later_read() {
        let inner = MemoryStore::from_roster(&Roster::example()).unwrap();
        let store = ReadsFailAfterCast {
            inner: inner.clone(),
            cast: AtomicBool::new(false),
        };
        let clock = ManualClock::new(ElectionWindow::example().starts_at() + Duration::minutes(5));
        let client = Client::tracked(crate::rocket_for_test(store, clock))
            .await
            .unwrap();

        let response = client
            .post(uri!(crate::api::auth::login))
            .header(ContentType::JSON)
            .body(json!(LoginRequest::example()).to_string())
            .dispatch()
            .await;
        assert_eq!(Status::Ok, response.status());

        let response = cast(&client, "C1").await;

        assert_eq!(Status::Ok, response.status());
        let receipt: CastReceipt = response.into_json().await.unwrap();
        let voted = Voter {
            has_voted: true,
            ..Voter::example()
        };
        assert_eq!(receipt.voter, VoterDesc::from(voted));

        let snapshot = inner.snapshot().await.unwrap();
        assert_eq!(snapshot.votes_cast(), 1);
        assert_eq!(snapshot.voters_voted, 1);
    }

    #[backend_test(voter)]
    async fn concurrent_casts_from_one_session(client: Client, store: MemoryStore) {
        const ATTEMPTS: usize = 8;

        let client = Arc::new(client);
        let barrier = Arc::new(Barrier::new(ATTEMPTS));
        let tasks: Vec<_> = (0..ATTEMPTS)
            .map(|i| {
                let client = client.clone();
                let barrier = barrier.clone();
                let candidate = if i % 2 == 0 { "C1" } else { "C2" };
                rocket::tokio::spawn(async move {
                    barrier.wait().await;
                    cast(&client, candidate).await.status()
                })
            })
            .collect();

        let mut statuses = Vec::new();
        for task in tasks {
            statuses.push(task.await.unwrap());
        }
        let accepted = statuses.iter().filter(|s| **s == Status::Ok).count();
        let conflicts = statuses.iter().filter(|s| **s == Status::Conflict).count();
        assert_eq!(accepted, 1);
        assert_eq!(conflicts, ATTEMPTS - 1);

        let snapshot = store.snapshot().await.unwrap();
        assert_eq!(snapshot.votes_cast(), 1);
        assert_eq!(snapshot.voters_voted, 1);
        assert!(
            store
                .voter(&VoterId::parse("A123").unwrap())
                .await
                .unwrap()
                .unwrap()
                .has_voted
        );
    }
}
