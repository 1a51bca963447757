use std::fmt::{Display, Formatter};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stages of the voting session. Derived from the clock, never stored.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Voting has not opened yet.
    Waiting,
    /// Ballots are being accepted.
    Active,
    /// Voting has closed; results are public.
    Ended,
}

impl Display for Phase {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{}",
            match self {
                Self::Waiting => "waiting",
                Self::Active => "active",
                Self::Ended => "ended",
            }
        )
    }
}

/// A resolved phase, carrying the countdown relevant to it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PhaseStatus {
    Waiting { time_until_start: Duration },
    Active { time_until_end: Duration },
    Ended,
}

impl PhaseStatus {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Waiting { .. } => Phase::Waiting,
            Self::Active { .. } => Phase::Active,
            Self::Ended => Phase::Ended,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("election window must start before it ends (starts {starts_at}, ends {ends_at})")]
pub struct WindowError {
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

/// The half-open interval `[starts_at, ends_at)` during which ballots are accepted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct ElectionWindow {
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

impl ElectionWindow {
    pub fn new(starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> Result<Self, WindowError> {
        if starts_at >= ends_at {
            return Err(WindowError { starts_at, ends_at });
        }
        Ok(Self { starts_at, ends_at })
    }

    pub fn starts_at(&self) -> DateTime<Utc> {
        self.starts_at
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.ends_at
    }

    /// Shorthand for [`resolve_phase`] against this window.
    pub fn resolve(&self, now: DateTime<Utc>) -> PhaseStatus {
        resolve_phase(now, self)
    }
}

/// Map an instant onto the voting phase it falls in.
pub fn resolve_phase(now: DateTime<Utc>, window: &ElectionWindow) -> PhaseStatus {
    if now < window.starts_at {
        PhaseStatus::Waiting {
            time_until_start: window.starts_at - now,
        }
    } else if now < window.ends_at {
        PhaseStatus::Active {
            time_until_end: window.ends_at - now,
        }
    } else {
        PhaseStatus::Ended
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    use chrono::TimeZone;

    impl ElectionWindow {
        /// 18:00 to 20:00 UTC on polling day.
        pub fn example() -> Self {
            Self::new(
                Utc.with_ymd_and_hms(2025, 11, 23, 18, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 11, 23, 20, 0, 0).unwrap(),
            )
            .unwrap()
        }
    }
}
