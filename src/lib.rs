#[macro_use]
extern crate rocket;

#[cfg(test)]
#[macro_use]
extern crate backend_test;

use std::sync::Arc;

use rocket::{Build, Rocket};

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod watcher;

pub use config::Config;

use config::{ConfigFairing, EngineFairing, StoreFairing};
use logging::LoggerFairing;
use model::clock::SystemClock;
use watcher::PhaseWatcherFairing;

/// Assemble the server from `Rocket.toml` and `ROCKET_*` environment variables.
pub fn build() -> Rocket<Build> {
    rocket::build()
        .attach(ConfigFairing)
        .attach(StoreFairing)
        .attach(EngineFairing::new(Arc::new(SystemClock)))
        .attach(PhaseWatcherFairing)
        .attach(LoggerFairing)
        .mount("/", api::routes())
        .register("/", api::catchers())
}

/// A server over the given store and clock, with the example election window.
#[cfg(test)]
pub(crate) fn rocket_for_test(
    store: impl model::store::VoteStore + 'static,
    clock: model::clock::ManualClock,
) -> Rocket<Build> {
    use model::{common::ElectionWindow, store::VoteStore};
    use rocket::figment::Figment;

    let window = ElectionWindow::example();
    let figment = Figment::from(rocket::Config::debug_default())
        .merge(("starts_at", window.starts_at().to_rfc3339()))
        .merge(("ends_at", window.ends_at().to_rfc3339()))
        .merge(("auth_ttl", 3600))
        .merge(("jwt_secret", "test secret"))
        .merge(("refresh_delay_ms", 0));
    let store: Arc<dyn VoteStore> = Arc::new(store);

    rocket::custom(figment)
        .attach(ConfigFairing)
        .manage(store)
        .attach(EngineFairing::new(Arc::new(clock)))
        .mount("/", api::routes())
        .register("/", api::catchers())
}
