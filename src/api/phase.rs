use rocket::{serde::json::Json, Route, State};

use crate::model::{api::phase::PhaseDesc, engine::ElectionEngine};

pub fn routes() -> Vec<Route> {
    routes![phase]
}

#[get("/phase")]
pub fn phase(engine: &State<ElectionEngine>) -> Json<PhaseDesc> {
    let now = engine.now();
    let status = engine.window().resolve(now);
    Json(PhaseDesc::new(status, engine.window(), now))
}
