use rocket::{
    http::{Cookie, CookieJar, Status},
    serde::json::Json,
    Route, State,
};

use crate::{
    config::Config,
    error::Result,
    model::{
        api::{
            auth::{AuthToken, LoginRequest, VoterSession, AUTH_TOKEN_COOKIE},
            voter::VoterDesc,
        },
        engine::ElectionEngine,
    },
};

pub fn routes() -> Vec<Route> {
    routes![login, me, logout]
}

#[post("/auth/login", data = "<request>", format = "json")]
pub async fn login(
    request: Json<LoginRequest>,
    cookies: &CookieJar<'_>,
    engine: &State<ElectionEngine>,
    config: &State<Config>,
) -> Result<Json<VoterDesc>> {
    let voter = engine.authenticate(&request.voter_id).await?;

    let token = AuthToken::new(&voter);
    cookies.add(token.into_cookie(config)?);

    Ok(Json(voter.into()))
}

#[get("/auth/me")]
pub fn me(session: VoterSession) -> Json<VoterDesc> {
    Json(session.voter.into())
}

#[delete("/auth")]
pub fn logout(cookies: &CookieJar) -> Status {
    cookies.remove(Cookie::named(AUTH_TOKEN_COOKIE));
    Status::Ok
}

#[cfg(test)]
mod tests {
    use rocket::{
        http::ContentType,
        local::asynchronous::{Client, LocalResponse},
        serde::json::{serde_json::json, Value},
    };

    use crate::model::{
        common::{CandidateId, VoterId},
        db::Voter,
        store::{MemoryStore, VoteStore},
    };

    use super::*;

    async fn try_login<'c>(client: &'c Client, voter_id: &str) -> LocalResponse<'c> {
        client
            .post(uri!(login))
            .header(ContentType::JSON)
            .body(json!({ "voter_id": voter_id }).to_string())
            .dispatch()
            .await
    }

    #[backend_test]
    async fn login_valid(client: Client) {
        let response = try_login(&client, "A123").await;

        assert_eq!(Status::Ok, response.status());
        let voter: VoterDesc = response.into_json().await.unwrap();
        assert_eq!(voter, VoterDesc::from(Voter::example()));
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
    }

    #[backend_test]
    async fn login_trims_whitespace(client: Client) {
        let response = try_login(&client, "  A123\t").await;

        assert_eq!(Status::Ok, response.status());
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());
    }

    #[backend_test]
    async fn login_blank_is_a_validation_error(client: Client) {
        let response = try_login(&client, "   ").await;

        assert_eq!(Status::BadRequest, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "validation");
        assert_eq!(body["message"], "Please enter your Voter ID");
        assert_eq!(body["retryable"], false);
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test]
    async fn login_unknown_voter(client: Client) {
        // Lookup is case-sensitive.
        let response = try_login(&client, "a123").await;

        assert_eq!(Status::NotFound, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "unknown_voter");
        assert_eq!(body["message"], "Invalid Voter ID. Please check and try again.");
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test(ended)]
    async fn login_works_in_any_phase(client: Client) {
        let response = try_login(&client, "B456").await;

        assert_eq!(Status::Ok, response.status());
    }

    #[backend_test]
    async fn me_requires_session(client: Client) {
        let response = client.get(uri!(me)).dispatch().await;

        assert_eq!(Status::Unauthorized, response.status());
        let body: Value = response.into_json().await.unwrap();
        assert_eq!(body["error"], "unauthorized");
    }

    #[backend_test(voter)]
    async fn me_reflects_the_store(client: Client, store: MemoryStore) {
        let response = client.get(uri!(me)).dispatch().await;
        let voter: VoterDesc = response.into_json().await.unwrap();
        assert!(!voter.has_voted);

        // Vote behind the session's back; the next read must see it.
        store
            .cast_vote(
                &VoterId::parse("A123").unwrap(),
                &CandidateId::parse("C1").unwrap(),
            )
            .await
            .unwrap();

        let response = client.get(uri!(me)).dispatch().await;
        let voter: VoterDesc = response.into_json().await.unwrap();
        assert!(voter.has_voted);
    }

    #[backend_test]
    async fn forged_cookie_is_unauthorized(client: Client) {
        let response = client
            .get(uri!(me))
            .cookie(Cookie::new(AUTH_TOKEN_COOKIE, "not-a-jwt"))
            .dispatch()
            .await;

        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test(admin)]
    async fn logout_admin(client: Client) {
        let response = client.delete(uri!(logout)).dispatch().await;

        assert_eq!(Status::Ok, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));
    }

    #[backend_test(voter)]
    async fn logout_voter(client: Client) {
        assert!(client.cookies().get(AUTH_TOKEN_COOKIE).is_some());

        let response = client.delete(uri!(logout)).dispatch().await;

        assert_eq!(Status::Ok, response.status());
        assert_eq!(None, client.cookies().get(AUTH_TOKEN_COOKIE));

        let response = client.get(uri!(me)).dispatch().await;
        assert_eq!(Status::Unauthorized, response.status());
    }

    #[backend_test]
    async fn logout_not_logged_in(client: Client) {
        let response = client.delete(uri!(logout)).dispatch().await;

        assert_eq!(Status::Ok, response.status());
    }
}
