use rocket::{serde::json::Json, Route, State};

use crate::error::{Error, Result};
use crate::model::{
    api::{auth::VoterSession, candidate::CandidateDesc, results::ElectionResults},
    engine::ElectionEngine,
};

pub fn routes() -> Vec<Route> {
    routes![results, winner]
}

/// Final results once voting has closed. Admins may look earlier and get
/// provisional figures.
#[get("/results")]
pub async fn results(
    session: Option<VoterSession>,
    engine: &State<ElectionEngine>,
) -> Result<Json<ElectionResults>> {
    let viewer = session.as_ref().map(|s| &s.voter);
    let results = engine.results(viewer).await?;
    Ok(Json(results.into()))
}

#[get("/results/winner")]
pub async fn winner(
    session: Option<VoterSession>,
    engine: &State<ElectionEngine>,
) -> Result<Json<CandidateDesc>> {
    let viewer = session.as_ref().map(|s| &s.voter);
    let winner = engine
        .winner(viewer)
        .await?
        .ok_or_else(|| Error::NotFound("There are no candidates".to_string()))?;
    Ok(Json(CandidateDesc::new(winner, true)))
}
