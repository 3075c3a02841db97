//! Sift Web Server
//!
//! Axum-based JSON API over the retrieval core.

pub mod error;
pub mod routes;
pub mod state;

use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use sift_core::SiftEngine;
use state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let api_routes = Router::new()
        // Retrieval
        .route("/search", post(routes::retrieval::search))
        .route("/query", post(routes::retrieval::query))
        .route("/extract", post(routes::retrieval::extract))
        // Entities
        .route("/entities", get(routes::entities::list_entities).post(routes::entities::create_entity))
        .route(
            "/entities/{name}",
            get(routes::entities::get_entity)
                .put(routes::entities::update_entity)
                .delete(routes::entities::delete_entity),
        )
        .route("/entities/{name}/related", get(routes::entities::related_entities))
        .route("/entities/{name}/aliases", post(routes::entities::add_alias))
        .route("/entities/{name}/aliases/{alias}", delete(routes::entities::remove_alias))
        // Schema
        .route("/schema", get(routes::schema::get_schema))
        .route("/schema/tables/{name}", get(routes::schema::get_table))
        .route("/schema/join-path", get(routes::schema::join_path))
        // Graph
        .route("/graph/build", post(routes::graph::build))
        .route("/graph/cancel", post(routes::graph::cancel))
        .route("/graph/stats", get(routes::graph::stats))
        .route("/graph/snapshot", get(routes::graph::snapshot))
        .route("/graph/nodes/{id}", get(routes::graph::get_node))
        .route("/graph/nodes/{id}/neighbors", get(routes::graph::neighbors))
        // Agents
        .route("/agents/{agent}/retrieval-config", get(routes::agents::get_config).put(routes::agents::put_config))
        .route("/agents/{agent}/retrieval-configs", get(routes::agents::list_configs));

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Run the web server.
pub async fn run_server(engine: Arc<SiftEngine>, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(AppState::new(engine));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", host, port)).await?;
    tracing::info!("Web server listening on http://{}:{}", host, port);

    axum::serve(listener, app).await?;
    Ok(())
}
