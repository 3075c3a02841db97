//! Retrieval route handlers.

use axum::{extract::State, Json};
use serde::Deserialize;

use sift_core::entity::ResolvedEntity;
use sift_core::retrieval::{SearchRequest, SearchResponse, StructuredQuery, StructuredResult};

use crate::error::{api_error, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ExtractRequest {
    pub query: String,
}

pub async fn search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let response = state.engine.search(&req).await.map_err(api_error)?;
    Ok(Json(response))
}

pub async fn query(
    State(state): State<AppState>,
    Json(req): Json<StructuredQuery>,
) -> Result<Json<StructuredResult>, ApiError> {
    let result = state.engine.query_structured_data(&req).map_err(api_error)?;
    Ok(Json(result))
}

pub async fn extract(State(state): State<AppState>, Json(req): Json<ExtractRequest>) -> Json<Vec<ResolvedEntity>> {
    Json(state.engine.extract_entities(&req.query))
}
