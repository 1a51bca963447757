use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::common::{ElectionWindow, Phase, PhaseStatus};

/// Where the election stands right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDesc {
    pub phase: Phase,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub now: DateTime<Utc>,
    /// Only while waiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_until_start_ms: Option<i64>,
    /// Only while active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_until_end_ms: Option<i64>,
}

impl PhaseDesc {
    pub fn new(status: PhaseStatus, window: &ElectionWindow, now: DateTime<Utc>) -> Self {
        let (time_until_start_ms, time_until_end_ms) = match status {
            PhaseStatus::Waiting { time_until_start } => {
                (Some(time_until_start.num_milliseconds()), None)
            }
            PhaseStatus::Active { time_until_end } => {
                (None, Some(time_until_end.num_milliseconds()))
            }
            PhaseStatus::Ended => (None, None),
        };
        Self {
            phase: status.phase(),
            starts_at: window.starts_at(),
            ends_at: window.ends_at(),
            now,
            time_until_start_ms,
            time_until_end_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn countdown_matches_phase() {
        let window = ElectionWindow::example();

        let now = window.starts_at() - Duration::seconds(90);
        let desc = PhaseDesc::new(window.resolve(now), &window, now);
        assert_eq!(desc.phase, Phase::Waiting);
        assert_eq!(desc.time_until_start_ms, Some(90_000));
        assert_eq!(desc.time_until_end_ms, None);

        let now = window.ends_at() - Duration::milliseconds(1);
        let desc = PhaseDesc::new(window.resolve(now), &window, now);
        assert_eq!(desc.phase, Phase::Active);
        assert_eq!(desc.time_until_end_ms, Some(1));

        let desc = PhaseDesc::new(window.resolve(window.ends_at()), &window, window.ends_at());
        assert_eq!(desc.phase, Phase::Ended);
        assert_eq!((desc.time_until_start_ms, desc.time_until_end_ms), (None, None));
    }
}
