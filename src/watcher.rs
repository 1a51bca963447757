//! The once-a-second phase tick.
//!
//! Nothing here changes shared state: the tick only re-resolves the phase and
//! logs what it sees.

use rocket::{
    fairing::{Fairing, Info, Kind},
    tokio::{
        self,
        time::{interval, Duration, MissedTickBehavior},
    },
    Orbit, Rocket, Shutdown,
};

use crate::model::{common::Phase, engine::ElectionEngine};

const TICK: Duration = Duration::from_secs(1);

/// A change of phase between two ticks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Transition {
    /// `None` on the very first tick.
    pub from: Option<Phase>,
    pub to: Phase,
}

/// Remembers the last phase seen.
#[derive(Debug, Default)]
pub struct PhaseTracker {
    last: Option<Phase>,
}

impl PhaseTracker {
    pub fn observe(&mut self, phase: Phase) -> Option<Transition> {
        if self.last == Some(phase) {
            return None;
        }
        let from = self.last.replace(phase);
        Some(Transition { from, to: phase })
    }
}

async fn announce(engine: &ElectionEngine, transition: Transition) {
    match (transition.from, transition.to) {
        (None, Phase::Waiting) => {
            info!("Voting opens at {}", engine.window().starts_at());
        }
        (None, Phase::Active) => {
            info!("Voting is open until {}", engine.window().ends_at());
        }
        (Some(_), Phase::Active) => info!("Voting is now open"),
        (from, Phase::Ended) => {
            if from.is_some() {
                info!("Voting has closed");
            } else {
                info!("Voting closed at {}", engine.window().ends_at());
            }
            match engine.results(None).await {
                Ok(results) => match results.winner() {
                    Some(winner) => info!(
                        "Final result: {} wins with {} of {} votes",
                        winner.display_name, winner.vote_count, results.total_votes
                    ),
                    None => warn!("Final result: there were no candidates"),
                },
                Err(e) => error!("Failed to read final results: {e}"),
            }
        }
        (Some(from), Phase::Waiting) => {
            warn!("Phase went backwards from {from} to waiting; is the clock right?");
        }
    }
}

async fn watch(engine: ElectionEngine, shutdown: Shutdown) {
    let mut tracker = PhaseTracker::default();
    let mut tick = interval(TICK);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.clone() => break,
        }
        if let Some(transition) = tracker.observe(engine.phase().phase()) {
            announce(&engine, transition).await;
        }
    }
    debug!("Phase watcher stopped");
}

/// A fairing that starts the phase tick at liftoff and stops it at shutdown.
pub struct PhaseWatcherFairing;

#[rocket::async_trait]
impl Fairing for PhaseWatcherFairing {
    fn info(&self) -> Info {
        Info {
            name: "Phase watcher",
            kind: Kind::Liftoff,
        }
    }

    async fn on_liftoff(&self, rocket: &Rocket<Orbit>) {
        let Some(engine) = rocket.state::<ElectionEngine>().cloned() else {
            error!("Phase watcher has no election engine to watch");
            return;
        };
        tokio::spawn(watch(engine, rocket.shutdown()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_observation_is_a_transition() {
        let mut tracker = PhaseTracker::default();
        assert_eq!(
            tracker.observe(Phase::Waiting),
            Some(Transition {
                from: None,
                to: Phase::Waiting
            })
        );
    }

    #[test]
    fn only_changes_are_reported() {
        let mut tracker = PhaseTracker::default();
        tracker.observe(Phase::Waiting);
        assert_eq!(tracker.observe(Phase::Waiting), None);
        assert_eq!(
            tracker.observe(Phase::Active),
            Some(Transition {
                from: Some(Phase::Waiting),
                to: Phase::Active
            })
        );
        assert_eq!(tracker.observe(Phase::Active), None);
        assert_eq!(
            tracker.observe(Phase::Ended),
            Some(Transition {
                from: Some(Phase::Active),
                to: Phase::Ended
            })
        );
        assert_eq!(tracker.observe(Phase::Ended), None);
    }
}
