use std::fmt::Display;

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::model::db::Voter;

/// Different privilege levels.
///
/// Carried in the session token for clients' convenience only; the server
/// always re-reads `is_admin` from the store.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Rights {
    Voter = 0,
    Admin = 1,
}

impl Rights {
    pub fn of(voter: &Voter) -> Self {
        if voter.is_admin {
            Self::Admin
        } else {
            Self::Voter
        }
    }
}

impl Display for Rights {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Voter => "voter",
                Self::Admin => "admin",
            }
        )
    }
}
