use chrono::{serde::ts_seconds, DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, TokenData, Validation};
use rocket::{
    http::{Cookie, SameSite},
    time::Duration,
};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::Error;
use crate::model::{common::VoterId, db::Voter};

use super::user::Rights;

pub const AUTH_TOKEN_COOKIE: &str = "auth_token";

/// An authentication token naming a voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    #[serde(rename = "sub")]
    pub voter_id: VoterId,
    #[serde(rename = "rgt")]
    pub rights: Rights,
}

impl AuthToken {
    /// Create a new [`AuthToken`] for the given voter.
    pub fn new(voter: &Voter) -> Self {
        Self {
            voter_id: voter.voter_id.clone(),
            rights: Rights::of(voter),
        }
    }

    /// Serialize this token into a session cookie.
    pub fn into_cookie(self, config: &Config) -> Result<Cookie<'static>, Error> {
        let claims = Claims {
            token: self,
            expire_at: Utc::now() + config.auth_ttl(),
        };

        let token = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )?;

        Ok(Cookie::build(AUTH_TOKEN_COOKIE, token)
            .max_age(Duration::seconds(config.auth_ttl().num_seconds()))
            .http_only(true)
            .same_site(SameSite::Strict)
            .finish())
    }

    /// Deserialize a token from a cookie. Fails if the signature is wrong or
    /// the token has expired.
    pub fn from_cookie(cookie: &Cookie<'_>, config: &Config) -> Result<Self, Error> {
        let token = jsonwebtoken::decode(
            cookie.value(),
            &DecodingKey::from_secret(config.jwt_secret()),
            &Validation::default(),
        )
        .map(|claims: TokenData<Claims>| claims.claims.token)?;
        Ok(token)
    }
}

/// Cookie claims: the token itself plus an expiry datetime.
#[derive(Serialize, Deserialize)]
struct Claims {
    #[serde(flatten)]
    token: AuthToken,
    #[serde(rename = "exp", with = "ts_seconds")]
    expire_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;

    #[test]
    fn cookie_round_trip() {
        let config = Config::example();
        let token = AuthToken::new(&Voter::admin_example());
        assert_eq!(token.rights, Rights::Admin);

        let cookie = token.clone().into_cookie(&config).unwrap();
        assert_eq!(cookie.name(), AUTH_TOKEN_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(AuthToken::from_cookie(&cookie, &config).unwrap(), token);
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = Config::example();
        let claims = Claims {
            token: AuthToken::new(&Voter::example()),
            expire_at: Utc::now() - ChronoDuration::hours(1),
        };
        let value = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(config.jwt_secret()),
        )
        .unwrap();

        let cookie = Cookie::new(AUTH_TOKEN_COOKIE, value);
        assert!(matches!(
            AuthToken::from_cookie(&cookie, &config),
            Err(Error::Jwt(_))
        ));
    }

    #[test]
    fn forged_token_is_rejected() {
        let config = Config::example();
        let claims = Claims {
            token: AuthToken::new(&Voter::example()),
            expire_at: Utc::now() + ChronoDuration::hours(1),
        };
        let value = jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"not the server's secret"),
        )
        .unwrap();

        let cookie = Cookie::new(AUTH_TOKEN_COOKIE, value);
        assert!(AuthToken::from_cookie(&cookie, &config).is_err());
    }
}
