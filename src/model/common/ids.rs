use std::fmt::{Display, Formatter};
use std::ops::Deref;

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Identifier of a registered voter, as printed on their voter card.
///
/// Always trimmed and non-empty. Comparison is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VoterId(String);

/// Identifier of a candidate on the ballot.
///
/// Always trimmed and non-empty. Comparison is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CandidateId(String);

macro_rules! impl_identifier {
    ($name:ident, $what:literal, $empty_message:literal) => {
        impl $name {
            /// Validate raw user input. Surrounding whitespace is ignored; anything
            /// left must be non-empty.
            pub fn parse(raw: &str) -> Result<Self, Error> {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Err(Error::Validation($empty_message.to_string()));
                }
                if trimmed.chars().any(char::is_control) {
                    return Err(Error::Validation(format!(
                        "{} contains control characters",
                        $what
                    )));
                }
                Ok(Self(trimmed.to_string()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Deref for $name {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = Error;

            fn try_from(raw: String) -> Result<Self, Self::Error> {
                Self::parse(&raw)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl From<&$name> for Bson {
            fn from(id: &$name) -> Self {
                Bson::String(id.0.clone())
            }
        }
    };
}

impl_identifier!(VoterId, "Voter ID", "Please enter your Voter ID");
impl_identifier!(CandidateId, "Candidate ID", "Please choose a candidate");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_trimmed() {
        let id = VoterId::parse("  A123\t").unwrap();
        assert_eq!(id.as_str(), "A123");

        let id = CandidateId::parse("\nC1 ").unwrap();
        assert_eq!(&*id, "C1");
    }

    #[test]
    fn blank_identifiers_are_rejected_locally() {
        for raw in ["", "   ", "\t\n"] {
            assert!(matches!(VoterId::parse(raw), Err(Error::Validation(_))));
            assert!(matches!(CandidateId::parse(raw), Err(Error::Validation(_))));
        }
    }

    #[test]
    fn control_characters_are_rejected() {
        assert!(matches!(
            VoterId::parse("A1\u{0}23"),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn comparison_is_case_sensitive() {
        assert_ne!(VoterId::parse("a123").unwrap(), VoterId::parse("A123").unwrap());
    }

    #[test]
    fn deserialization_validates() {
        use rocket::serde::json::serde_json;

        let id: VoterId = serde_json::from_str("\" A123 \"").unwrap();
        assert_eq!(id.as_str(), "A123");
        assert!(serde_json::from_str::<VoterId>("\"  \"").is_err());
    }
}
