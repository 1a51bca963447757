use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request, Response,
};
use serde::Serialize;
use thiserror::Error;

use crate::model::{common::Rejection, store::StoreError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, caught before the store is consulted.
    #[error("Invalid input: {0}")]
    Validation(String),
    /// A business rule refused the request.
    #[error("{}", .0.message())]
    Rejected(Rejection),
    /// The store failed or timed out. Nothing was changed and the request may be retried.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Self::Validation(_) => Status::BadRequest,
            Self::Rejected(rejection) => match rejection {
                Rejection::VotingNotActive => Status::Forbidden,
                Rejection::UnknownVoter | Rejection::UnknownCandidate => Status::NotFound,
                Rejection::AlreadyVoted => Status::Conflict,
            },
            Self::StoreUnavailable(_) => Status::ServiceUnavailable,
            Self::Jwt(_) => Status::InternalServerError,
            Self::Unauthorized(_) => Status::Unauthorized,
            Self::Forbidden(_) => Status::Forbidden,
            Self::NotFound(_) => Status::NotFound,
        }
    }

    /// Machine-readable kind for API clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Rejected(rejection) => rejection.kind(),
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::Jwt(_) => "internal",
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not_found",
        }
    }

    /// Only store failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// What to tell the client. Infrastructure details stay in the logs.
    pub fn message(&self) -> String {
        match self {
            Self::Validation(msg)
            | Self::Unauthorized(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg) => msg.clone(),
            Self::Rejected(rejection) => rejection.message().to_string(),
            Self::StoreUnavailable(_) => {
                "The election system is temporarily unavailable. Please try again.".to_string()
            }
            Self::Jwt(_) => "Internal server error".to_string(),
        }
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            error: err.kind(),
            message: err.message(),
            retryable: err.is_retryable(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        if status.class() == StatusClass::ServerError {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        Response::build_from(Json(ErrorBody::from(&self)).respond_to(req)?)
            .status(status)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn rejections_map_to_distinct_statuses() {
        assert_eq!(
            Error::from(Rejection::VotingNotActive).status(),
            Status::Forbidden
        );
        assert_eq!(Error::from(Rejection::UnknownVoter).status(), Status::NotFound);
        assert_eq!(
            Error::from(Rejection::UnknownCandidate).status(),
            Status::NotFound
        );
        assert_eq!(Error::from(Rejection::AlreadyVoted).status(), Status::Conflict);
    }

    #[test]
    fn only_store_failures_are_retryable() {
        let unavailable = Error::from(StoreError::Timeout(Duration::from_secs(5)));
        assert!(unavailable.is_retryable());
        assert_eq!(unavailable.status(), Status::ServiceUnavailable);
        assert!(!unavailable.message().contains("5s"));

        assert!(!Error::from(Rejection::AlreadyVoted).is_retryable());
        assert!(!Error::Validation("Please enter your Voter ID".to_string()).is_retryable());
    }

    #[test]
    fn body_carries_kind_and_reason() {
        let body = ErrorBody::from(&Error::from(Rejection::AlreadyVoted));
        assert_eq!(
            body,
            ErrorBody {
                error: "already_voted",
                message: "You have already cast your vote".to_string(),
                retryable: false,
            }
        );
    }
}
