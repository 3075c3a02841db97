//! Knowledge graph route handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use sift_core::graph::{BuildOptions, BuildReport, BuildStats, BuildSummary, GraphEdge, GraphNode, GraphSnapshot};
use sift_core::SiftError;

use crate::error::{api_error, ApiError};
use crate::state::AppState;

const DEFAULT_SNAPSHOT_LIMIT: usize = 500;

#[derive(Deserialize)]
pub struct BuildParams {
    #[serde(default)]
    pub embeddings: bool,
}

#[derive(Deserialize)]
pub struct SnapshotParams {
    pub limit: Option<usize>,
}

#[derive(Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub stats: BuildStats,
    pub building: bool,
    pub last_build: Option<BuildSummary>,
}

#[derive(Serialize)]
pub struct Neighbor {
    pub edge: GraphEdge,
    pub node: GraphNode,
}

#[derive(Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

pub async fn build(
    State(state): State<AppState>,
    Query(params): Query<BuildParams>,
) -> Result<Json<BuildReport>, ApiError> {
    let options = BuildOptions {
        generate_embeddings: params.embeddings,
    };
    let report = state.engine.build_graph(options).await.map_err(api_error)?;
    Ok(Json(report))
}

pub async fn cancel(State(state): State<AppState>) -> Json<CancelResponse> {
    Json(CancelResponse {
        cancelled: state.engine.cancel_build(),
    })
}

pub async fn stats(State(state): State<AppState>) -> Result<Json<StatsResponse>, ApiError> {
    let graph = state.engine.graph();
    Ok(Json(StatsResponse {
        stats: graph.get_stats().map_err(api_error)?,
        building: graph.is_building(),
        last_build: graph.latest_build().map_err(api_error)?,
    }))
}

pub async fn snapshot(
    State(state): State<AppState>,
    Query(params): Query<SnapshotParams>,
) -> Result<Json<GraphSnapshot>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_SNAPSHOT_LIMIT);
    let snapshot = state.engine.graph().snapshot(limit).map_err(api_error)?;
    Ok(Json(snapshot))
}

pub async fn get_node(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<GraphNode>, ApiError> {
    state
        .engine
        .graph()
        .get_node(&id)
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| api_error(SiftError::not_found(format!("node '{}'", id))))
}

pub async fn neighbors(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Neighbor>>, ApiError> {
    let found = state.engine.graph().neighbors(&id).map_err(api_error)?;
    Ok(Json(found.into_iter().map(|(edge, node)| Neighbor { edge, node }).collect()))
}
