//! Per-agent retrieval configuration handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use sift_core::retrieval::RetrievalConfig;

use crate::error::{api_error, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ScopeParams {
    pub data_source: Option<String>,
}

#[derive(Serialize)]
pub struct StoredConfig {
    pub data_source_id: Option<String>,
    pub config: RetrievalConfig,
}

/// Effective configuration after fallbacks.
pub async fn get_config(
    State(state): State<AppState>,
    Path(agent): Path<String>,
    Query(params): Query<ScopeParams>,
) -> Json<RetrievalConfig> {
    Json(state.engine.retriever().config_for(Some(&agent), params.data_source.as_deref()))
}

pub async fn put_config(
    State(state): State<AppState>,
    Path(agent): Path<String>,
    Query(params): Query<ScopeParams>,
    Json(config): Json<RetrievalConfig>,
) -> Result<Json<RetrievalConfig>, ApiError> {
    state
        .engine
        .retriever()
        .save_retrieval_config(&agent, params.data_source.as_deref(), &config)
        .map_err(api_error)?;
    Ok(Json(config))
}

pub async fn list_configs(
    State(state): State<AppState>,
    Path(agent): Path<String>,
) -> Result<Json<Vec<StoredConfig>>, ApiError> {
    let configs = state.engine.retriever().list_retrieval_configs(&agent).map_err(api_error)?;
    Ok(Json(
        configs
            .into_iter()
            .map(|(data_source_id, config)| StoredConfig { data_source_id, config })
            .collect(),
    ))
}
