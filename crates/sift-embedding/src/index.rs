//! Graph node embeddings in Qdrant, exposed to the core as a vector index
//! and as the build-time node indexer.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use sift_core::graph::{GraphNode, NodeIndexer};
use sift_core::retrieval::{VectorHit, VectorIndex};
use sift_core::{SiftError, SiftResult};

use crate::ollama::{OllamaClient, EMBEDDING_DIM};
use crate::qdrant::{QdrantStore, VectorPoint, VectorSearchResult};

/// Points written per upsert call.
const UPSERT_BATCH: usize = 64;

/// Qdrant-backed vector index over graph nodes, embedded through Ollama.
pub struct QdrantNodeIndex {
    ollama: OllamaClient,
    qdrant: QdrantStore,
    collection: String,
}

impl QdrantNodeIndex {
    pub fn new(ollama: OllamaClient, qdrant: QdrantStore, collection: &str) -> Self {
        Self {
            ollama,
            qdrant,
            collection: collection.to_string(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub async fn point_count(&self) -> Result<u64> {
        self.qdrant.count(&self.collection).await
    }

    async fn search(&self, text: &str, limit: usize) -> Result<Vec<VectorHit>> {
        let vector = self.ollama.embed(text).await.context("Failed to embed search query")?;
        debug!(dim = vector.len(), collection = %self.collection, "Generated query embedding");

        let found = self
            .qdrant
            .search(&self.collection, vector, limit as u64)
            .await
            .context("Failed to search node vectors")?;
        Ok(found.into_iter().filter_map(to_hit).collect())
    }

    /// Replace the collection contents with the given nodes.
    ///
    /// Every node is embedded before the collection is touched, so a failing
    /// model leaves the previous vectors in place.
    async fn index(&self, nodes: &[GraphNode]) -> Result<usize> {
        let mut pending = Vec::with_capacity(nodes.len());
        for node in nodes {
            let content = node.describe();
            let vector = self
                .ollama
                .embed(&content)
                .await
                .with_context(|| format!("Failed to embed node {}", node.id))?;
            pending.push(VectorPoint {
                id: node.id.clone(),
                vector,
                payload: node_payload(node, content),
            });
        }
        debug!(nodes = pending.len(), "Embedded graph nodes");

        self.qdrant.reset_collection(&self.collection, EMBEDDING_DIM).await?;

        let mut written = 0;
        while !pending.is_empty() {
            let batch: Vec<VectorPoint> = pending.drain(..pending.len().min(UPSERT_BATCH)).collect();
            written += self.qdrant.upsert_batch(&self.collection, batch).await?;
        }

        info!(collection = %self.collection, nodes = written, "Indexed graph nodes");
        Ok(written)
    }
}

fn node_payload(node: &GraphNode, content: String) -> serde_json::Map<String, serde_json::Value> {
    let mut payload = serde_json::Map::new();
    payload.insert("node_id".into(), node.id.clone().into());
    payload.insert("entity".into(), node.node_type.clone().into());
    payload.insert("name".into(), node.name.clone().into());
    payload.insert("content".into(), content.into());
    payload.insert("importance".into(), node.importance_score.into());
    if let Some(table) = &node.source_table {
        payload.insert("table".into(), table.clone().into());
    }
    if let Some(source_id) = &node.source_id {
        payload.insert("source_id".into(), source_id.clone().into());
    }
    payload
}

/// Cosine similarity mapped into [0, 1]; points without a node id are skipped.
fn to_hit(result: VectorSearchResult) -> Option<VectorHit> {
    let mut metadata = result.payload;
    let id = match metadata.remove("node_id") {
        Some(serde_json::Value::String(id)) => id,
        _ => return None,
    };
    let content = match metadata.remove("content") {
        Some(serde_json::Value::String(content)) => content,
        _ => String::new(),
    };
    Some(VectorHit {
        id,
        score: f64::from(result.score).clamp(0.0, 1.0),
        content,
        metadata,
    })
}

fn unavailable(e: anyhow::Error) -> SiftError {
    SiftError::BackendUnavailable(format!("{:#}", e))
}

#[async_trait]
impl VectorIndex for QdrantNodeIndex {
    async fn similar(&self, text: &str, limit: usize) -> SiftResult<Vec<VectorHit>> {
        self.search(text, limit).await.map_err(unavailable)
    }
}

#[async_trait]
impl NodeIndexer for QdrantNodeIndex {
    async fn index_nodes(&self, nodes: &[GraphNode]) -> SiftResult<usize> {
        self.index(nodes).await.map_err(unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use sift_core::graph::{Properties, PropertyValue};

    fn node() -> GraphNode {
        let mut properties = Properties::new();
        properties.insert("email".into(), PropertyValue::String("ops@acme.io".into()));
        GraphNode {
            id: "customer:1".into(),
            node_type: "customer".into(),
            name: "Acme Corp".into(),
            properties,
            importance_score: 0.6,
            source_table: Some("customers".into()),
            source_id: Some("1".into()),
        }
    }

    #[test]
    fn test_payload_carries_node_identity() {
        let node = node();
        let payload = node_payload(&node, node.describe());
        assert_eq!(payload["node_id"], "customer:1");
        assert_eq!(payload["entity"], "customer");
        assert_eq!(payload["source_id"], "1");
        assert_eq!(payload["content"], "customer Acme Corp | email: ops@acme.io");
    }

    #[test]
    fn test_hit_from_search_result() {
        let node = node();
        let result = VectorSearchResult {
            score: 0.92,
            payload: node_payload(&node, node.describe()),
        };
        let hit = to_hit(result).unwrap();
        assert_eq!(hit.id, "customer:1");
        assert!((hit.score - 0.92).abs() < 1e-6);
        assert_eq!(hit.metadata["entity"], "customer");
        assert!(!hit.metadata.contains_key("node_id"));

        let negative = VectorSearchResult {
            score: -0.3,
            payload: node_payload(&node, String::new()),
        };
        assert_eq!(to_hit(negative).unwrap().score, 0.0);

        let orphan = VectorSearchResult {
            score: 0.9,
            payload: serde_json::Map::new(),
        };
        assert!(to_hit(orphan).is_none());
    }

    #[tokio::test]
    async fn test_failed_embedding_leaves_collection_untouched() {
        let router = Router::new().route(
            "/api/embeddings",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        // Nothing listens here; any collection call would fail with a Qdrant error.
        let qdrant = QdrantStore::new("http://127.0.0.1:1").unwrap();
        let index = QdrantNodeIndex::new(
            OllamaClient::new(&format!("http://{}", addr), "nomic-embed-text"),
            qdrant,
            "sift_nodes",
        );

        let err = index.index(&[node()]).await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.starts_with("Failed to embed node customer:1"), "{}", message);
        assert!(message.contains("model not loaded"));
        assert!(!message.contains("collection"));
    }
}
