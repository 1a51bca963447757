//! Stored record types.
//!
//! These are serialised the same way for the database and for roster files.

mod candidate;
pub use candidate::Candidate;

mod roster;
pub use roster::{Roster, RosterError};

mod voter;
pub use voter::Voter;
