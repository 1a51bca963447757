mod request;
mod session;
mod token;
mod user;

pub use request::LoginRequest;
pub use session::{AdminSession, VoterSession};
pub use token::{AuthToken, AUTH_TOKEN_COOKIE};
pub use user::Rights;
