use rocket::{
    http::Status,
    outcome::try_outcome,
    request::{FromRequest, Outcome},
    Request,
};

use crate::config::Config;
use crate::error::Error;
use crate::model::{db::Voter, engine::ElectionEngine};

use super::token::{AuthToken, AUTH_TOKEN_COOKIE};

/// A logged-in voter, freshly read from the store.
///
/// The session cookie only says who the voter is. Whether they have voted and
/// whether they are an admin always come from the store.
#[derive(Debug, Clone)]
pub struct VoterSession {
    pub voter: Voter,
}

/// A logged-in voter whose record marks them as an admin.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub voter: Voter,
}

fn unauthorized(message: &str) -> Outcome<VoterSession, Error> {
    Outcome::Failure((Status::Unauthorized, Error::Unauthorized(message.to_string())))
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for VoterSession {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let (Some(config), Some(engine)) = (
            req.rocket().state::<Config>(),
            req.rocket().state::<ElectionEngine>(),
        ) else {
            error!("Session guard used without config and engine in managed state");
            return Outcome::Failure((
                Status::InternalServerError,
                Error::Unauthorized("Sessions are unavailable".to_string()),
            ));
        };

        let Some(cookie) = req.cookies().get(AUTH_TOKEN_COOKIE) else {
            return unauthorized("Please log in with your Voter ID");
        };
        let token = match AuthToken::from_cookie(cookie, config) {
            Ok(token) => token,
            Err(e) => {
                debug!("Rejected session cookie: {e}");
                return unauthorized("Your session has expired. Please log in again.");
            }
        };

        match engine.voter(&token.voter_id).await {
            Ok(Some(voter)) => Outcome::Success(Self { voter }),
            Ok(None) => unauthorized("Your session has expired. Please log in again."),
            Err(e) => Outcome::Failure((e.status(), e)),
        }
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AdminSession {
    type Error = Error;

    async fn from_request(req: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let session = try_outcome!(req.guard::<VoterSession>().await);
        if session.voter.is_admin {
            Outcome::Success(Self {
                voter: session.voter,
            })
        } else {
            Outcome::Failure((
                Status::Forbidden,
                Error::Forbidden("Administrator access is required".to_string()),
            ))
        }
    }
}
