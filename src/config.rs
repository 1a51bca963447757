use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use rocket::{
    fairing::{Fairing, Info, Kind},
    Build, Rocket,
};
use serde::Deserialize;

use crate::model::{
    clock::Clock,
    common::{ElectionWindow, WindowError},
    db::Roster,
    engine::ElectionEngine,
    store::{MemoryStore, MongoStore, VoteStore},
};

/// Application configuration, derived from `Rocket.toml` and `ROCKET_*`
/// environment variables. This struct becomes managed state and can be
/// inspected by any endpoint.
#[derive(Clone, Deserialize)]
pub struct Config {
    // non-secrets
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    auth_ttl: u32,
    #[serde(default = "default_store_timeout_ms")]
    store_timeout_ms: u64,
    #[serde(default = "default_refresh_delay_ms")]
    refresh_delay_ms: u64,
    // secrets
    jwt_secret: String,
}

fn default_store_timeout_ms() -> u64 {
    5000
}

fn default_refresh_delay_ms() -> u64 {
    1000
}

impl Config {
    /// The voting window. Fails if it does not start before it ends.
    pub fn window(&self) -> Result<ElectionWindow, WindowError> {
        ElectionWindow::new(self.starts_at, self.ends_at)
    }

    /// Valid lifetime of auth token cookies in seconds.
    pub fn auth_ttl(&self) -> Duration {
        Duration::seconds(self.auth_ttl.into())
    }

    /// Secret key used to sign JWTs.
    pub fn jwt_secret(&self) -> &[u8] {
        self.jwt_secret.as_bytes()
    }

    /// Longest any single store call may take.
    pub fn store_timeout(&self) -> StdDuration {
        StdDuration::from_millis(self.store_timeout_ms)
    }

    /// How long clients should wait after casting before refreshing tallies.
    pub fn refresh_delay_ms(&self) -> u64 {
        self.refresh_delay_ms
    }
}

/// A fairing that loads the application config and puts it in managed state.
/// This could easily be achieved using `AdHoc::config`, but is written out
/// explicitly for symmetry with the other fairings and control over error
/// messages.
pub struct ConfigFairing;

#[rocket::async_trait]
impl Fairing for ConfigFairing {
    fn info(&self) -> Info {
        Info {
            name: "Config",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load application config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // The window is immutable from here on, so check it once.
        if let Err(e) = config.window() {
            error!("Invalid election window: {e}");
            return Err(rocket);
        }

        // Manage the state.
        rocket = rocket.manage(config);
        Ok(rocket)
    }
}

/// Which store implementation to run against.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Mongodb,
}

/// Configuration for the vote store.
#[derive(Debug, Deserialize)]
struct StoreConfig {
    // non-secrets
    #[serde(default)]
    store: StoreBackend,
    #[serde(default = "default_db_name")]
    db_name: String,
    roster: Option<PathBuf>,
    // secrets
    db_uri: Option<String>,
}

fn default_db_name() -> String {
    "election".to_string()
}

/// A fairing that loads the store config, connects to the configured store,
/// loads the roster into it, and places an `Arc<dyn VoteStore>` into managed
/// state.
pub struct StoreFairing;

impl StoreFairing {
    async fn connect(config: &StoreConfig) -> Option<Arc<dyn VoteStore>> {
        match config.store {
            StoreBackend::Memory => {
                info!("Using in-memory vote store");
                Some(Arc::new(MemoryStore::new()))
            }
            StoreBackend::Mongodb => {
                let Some(db_uri) = &config.db_uri else {
                    error!("`db_uri` must be set when `store` is \"mongodb\"");
                    return None;
                };
                info!("Loaded database config, connecting...");
                match MongoStore::connect(db_uri, &config.db_name).await {
                    Ok(store) => {
                        info!("...database connection online!");
                        Some(Arc::new(store))
                    }
                    Err(e) => {
                        error!("Failed to connect to database: {e}");
                        None
                    }
                }
            }
        }
    }
}

#[rocket::async_trait]
impl Fairing for StoreFairing {
    fn info(&self) -> Info {
        Info {
            name: "Vote store",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        // Load the config.
        let config = match rocket.figment().extract::<StoreConfig>() {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to load store config");
                rocket::config::pretty_print_error(e);
                return Err(rocket);
            }
        };

        // Construct the store.
        let Some(store) = Self::connect(&config).await else {
            return Err(rocket);
        };

        // Provision voters and candidates.
        match &config.roster {
            Some(path) => {
                let roster = match Roster::from_file(path) {
                    Ok(roster) => roster,
                    Err(e) => {
                        error!("Failed to load roster from {}: {e}", path.display());
                        return Err(rocket);
                    }
                };
                if let Err(e) = store.load_roster(&roster).await {
                    error!("Failed to store roster: {e}");
                    return Err(rocket);
                }
                info!(
                    "Roster {} provides {} voters and {} candidates",
                    path.display(),
                    roster.voters.len(),
                    roster.candidates.len()
                );
            }
            None => warn!("No roster configured; the store is used as is"),
        }

        // Manage the state.
        rocket = rocket.manage(store);
        Ok(rocket)
    }
}

/// A fairing that assembles the [`ElectionEngine`] from the managed config and
/// store. Must be attached after [`ConfigFairing`] and after the store is
/// managed.
pub struct EngineFairing {
    clock: Arc<dyn Clock>,
}

impl EngineFairing {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[rocket::async_trait]
impl Fairing for EngineFairing {
    fn info(&self) -> Info {
        Info {
            name: "Election engine",
            kind: Kind::Ignite,
        }
    }

    async fn on_ignite(&self, mut rocket: Rocket<Build>) -> rocket::fairing::Result {
        let Some(config) = rocket.state::<Config>() else {
            error!("Election engine requires the application config");
            return Err(rocket);
        };
        let window = match config.window() {
            Ok(window) => window,
            Err(e) => {
                error!("Invalid election window: {e}");
                return Err(rocket);
            }
        };
        let store_timeout = config.store_timeout();
        let Some(store) = rocket.state::<Arc<dyn VoteStore>>().cloned() else {
            error!("Election engine requires a vote store");
            return Err(rocket);
        };

        let engine = ElectionEngine::new(window, store, self.clock.clone(), store_timeout);
        rocket = rocket.manage(engine);
        Ok(rocket)
    }
}

/// Example data for tests.
#[cfg(test)]
mod examples {
    use super::*;

    impl Config {
        /// Polling day, 18:00 to 20:00 UTC.
        pub fn example() -> Self {
            let window = ElectionWindow::example();
            Self {
                starts_at: window.starts_at(),
                ends_at: window.ends_at(),
                auth_ttl: 3600,
                store_timeout_ms: default_store_timeout_ms(),
                refresh_delay_ms: default_refresh_delay_ms(),
                jwt_secret: "example secret, do not deploy".to_string(),
            }
        }
    }
}
