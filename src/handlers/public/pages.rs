use axum::extract::State;
use serde::Serialize;

use crate::extractors::Json;
use crate::models::PledgeOptions;
use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Pricing, limits and allowed choices for the pledge form.
pub async fn pledge_options(State(state): State<AppState>) -> Json<PledgeOptions> {
    Json(PledgeOptions::new(&state.pledge_limits()))
}
