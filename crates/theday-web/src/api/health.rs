use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use super::error_response;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, (StatusCode, String)> {
    let storage = state.storage().await.map_err(error_response)?;
    storage.ping().await.map_err(error_response)?;

    Ok(Json(HealthResponse { status: "ok" }))
}
