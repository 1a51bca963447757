//! API-compatible types.
//!
//! The types in this module are serialised in an API-friendly way, e.g.:
//!
//! - Datetimes are serialised as RFC 3339 strings.
//! - Durations are serialised as whole milliseconds.
//! - Vote counts are omitted entirely when the viewer may not see them.

pub mod auth;
pub mod ballot;
pub mod candidate;
pub mod phase;
pub mod results;
pub mod voter;
