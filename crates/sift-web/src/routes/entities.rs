//! Entity and alias route handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use sift_core::entity::SemanticEntity;
use sift_core::SiftError;

use crate::error::{api_error, ApiError};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct AliasRequest {
    pub alias: String,
}

pub async fn list_entities(State(state): State<AppState>) -> Result<Json<Vec<SemanticEntity>>, ApiError> {
    let entities = state.engine.resolver().get_all_entities().map_err(api_error)?;
    Ok(Json(entities))
}

pub async fn get_entity(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SemanticEntity>, ApiError> {
    state
        .engine
        .resolver()
        .get_entity(&name)
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| api_error(SiftError::not_found(format!("entity '{}'", name))))
}

pub async fn create_entity(
    State(state): State<AppState>,
    Json(entity): Json<SemanticEntity>,
) -> Result<(StatusCode, Json<SemanticEntity>), ApiError> {
    let resolver = state.engine.resolver();
    resolver.register_entity(&entity).map_err(api_error)?;
    let stored = resolver
        .get_entity(&entity.name)
        .map_err(api_error)?
        .ok_or_else(|| api_error(SiftError::not_found(format!("entity '{}'", entity.name))))?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub async fn update_entity(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(entity): Json<SemanticEntity>,
) -> Result<Json<SemanticEntity>, ApiError> {
    let resolver = state.engine.resolver();
    resolver.update_entity(&name, &entity).map_err(api_error)?;
    resolver
        .get_entity(&name)
        .map_err(api_error)?
        .map(Json)
        .ok_or_else(|| api_error(SiftError::not_found(format!("entity '{}'", name))))
}

pub async fn delete_entity(State(state): State<AppState>, Path(name): Path<String>) -> Result<StatusCode, ApiError> {
    state.engine.resolver().remove_entity(&name).map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn related_entities(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<SemanticEntity>>, ApiError> {
    let related = state.engine.resolver().get_related(&name).map_err(api_error)?;
    Ok(Json(related))
}

pub async fn add_alias(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<AliasRequest>,
) -> Result<StatusCode, ApiError> {
    state.engine.resolver().add_alias(&req.alias, &name).map_err(api_error)?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_alias(
    State(state): State<AppState>,
    Path((name, alias)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.engine.resolver().remove_alias(&alias, &name).map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}
