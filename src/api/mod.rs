use rocket::{http::Status, serde::json::Json, Catcher, Request, Route};

use crate::error::ErrorBody;

mod admin;
pub mod auth;
mod candidates;
mod phase;
mod results;
mod voting;

pub fn routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(phase::routes());
    routes.extend(auth::routes());
    routes.extend(candidates::routes());
    routes.extend(voting::routes());
    routes.extend(results::routes());
    routes.extend(admin::routes());
    routes
}

pub fn catchers() -> Vec<Catcher> {
    catchers![default_catcher]
}

/// Give failed guards and unparseable bodies the same JSON shape as every
/// other error.
#[catch(default)]
fn default_catcher(status: Status, _req: &Request<'_>) -> (Status, Json<ErrorBody>) {
    let (error, message) = match status.code {
        400 | 422 => ("validation", "The request could not be understood"),
        401 => ("unauthorized", "Please log in with your Voter ID"),
        403 => ("forbidden", "You are not allowed to do that"),
        404 => ("not_found", "Not found"),
        503 => (
            "store_unavailable",
            "The election system is temporarily unavailable. Please try again.",
        ),
        _ => ("internal", "Internal server error"),
    };
    let body = ErrorBody {
        error,
        message: message.to_string(),
        retryable: status == Status::ServiceUnavailable,
    };
    (status, Json(body))
}
