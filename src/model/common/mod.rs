mod ids;
mod phase;
mod rejection;

pub use ids::{CandidateId, VoterId};
pub use phase::{resolve_phase, ElectionWindow, Phase, PhaseStatus, WindowError};
pub use rejection::Rejection;
