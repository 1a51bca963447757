use rocket::{serde::json::Json, Route, State};

use crate::error::Result;
use crate::model::{
    api::{auth::AdminSession, results::TurnoutDesc},
    engine::ElectionEngine,
};

pub fn routes() -> Vec<Route> {
    routes![turnout]
}

#[get("/admin/turnout")]
async fn turnout(
    _session: AdminSession,
    engine: &State<ElectionEngine>,
) -> Result<Json<TurnoutDesc>> {
    let turnout = engine.turnout().await?;
    Ok(Json(turnout.into()))
}
