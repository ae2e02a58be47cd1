use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use theday_core::{FolderListing, Item, TreeMutationProcessor, decode_batch};

use super::error_response;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/batch", post(apply_batch))
        .route("/{id}", get(get_item))
        .route("/{id}/children", get(list_children))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub data: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub success: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChildrenQuery {
    #[serde(default, rename = "includeTrashed")]
    include_trashed: bool,
}

async fn apply_batch(
    State(state): State<AppState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, (StatusCode, String)> {
    let Json(request) = payload.map_err(|e| (StatusCode::BAD_REQUEST, e.body_text()))?;

    let mutations =
        decode_batch(request.data, state.config.unknown_mutations).map_err(error_response)?;

    let storage = state.storage().await.map_err(error_response)?;
    TreeMutationProcessor::new(storage)
        .apply(&mutations)
        .await
        .map_err(error_response)?;

    Ok(Json(BatchResponse { success: true }))
}

async fn get_item(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Item>, (StatusCode, String)> {
    let storage = state.storage().await.map_err(error_response)?;
    let item = storage.get_item(&id).await.map_err(error_response)?;

    Ok(Json(item))
}

async fn list_children(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ChildrenQuery>,
) -> Result<Json<FolderListing>, (StatusCode, String)> {
    let storage = state.storage().await.map_err(error_response)?;
    let listing = storage
        .list_children(&id, query.include_trashed)
        .await
        .map_err(error_response)?;

    Ok(Json(listing))
}
