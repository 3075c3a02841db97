//! Schema catalog route handlers.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use sift_core::schema::{SchemaDefinition, TableDefinition, TableRelationship};
use sift_core::SiftError;

use crate::error::{api_error, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct JoinPathParams {
    pub from: String,
    pub to: String,
}

#[derive(Serialize)]
pub struct TableDetail {
    #[serde(flatten)]
    pub table: TableDefinition,
    pub row_count: i64,
}

pub async fn get_schema(State(state): State<AppState>) -> Result<Json<SchemaDefinition>, ApiError> {
    let schema = state.engine.catalog().get_schema().map_err(api_error)?;
    Ok(Json(schema.as_ref().clone()))
}

pub async fn get_table(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<TableDetail>, ApiError> {
    let catalog = state.engine.catalog();
    let table = catalog
        .get_table(&name)
        .map_err(api_error)?
        .ok_or_else(|| api_error(SiftError::not_found(format!("table '{}'", name))))?;
    let row_count = catalog.get_row_count(&table.name);
    Ok(Json(TableDetail { table, row_count }))
}

/// An empty list means no path connects the tables.
pub async fn join_path(
    State(state): State<AppState>,
    Query(params): Query<JoinPathParams>,
) -> Result<Json<Vec<TableRelationship>>, ApiError> {
    let path = state
        .engine
        .catalog()
        .get_join_path(&params.from, &params.to)
        .map_err(api_error)?;
    Ok(Json(path.unwrap_or_default()))
}
