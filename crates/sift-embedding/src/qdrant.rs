//! Qdrant vector store client.
//!
//! Manages the node collection, upserts vectors in batches and runs
//! similarity search through the qdrant-client gRPC library.

use anyhow::{Context, Result};
use qdrant_client::qdrant::{
    value::Kind, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder, Value,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6334";

/// A scored point with its payload.
#[derive(Debug, Clone)]
pub struct VectorSearchResult {
    pub score: f32,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// A point waiting to be written.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// Qdrant vector store client.
#[derive(Clone)]
pub struct QdrantStore {
    client: Qdrant,
}

impl QdrantStore {
    pub fn new(url: &str) -> Result<Self> {
        let client = Qdrant::from_url(url).build().context("Failed to create Qdrant client")?;
        Ok(Self { client })
    }

    /// Create the collection if missing.
    pub async fn ensure_collection(&self, collection: &str, dim: usize) -> Result<()> {
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .context("Failed to check collection")?;

        if exists {
            debug!(collection, "Collection already exists");
            return Ok(());
        }
        self.client
            .create_collection(
                CreateCollectionBuilder::new(collection)
                    .vectors_config(VectorParamsBuilder::new(dim as u64, Distance::Cosine)),
            )
            .await
            .context("Failed to create collection")?;

        info!(collection, dim, "Created Qdrant collection");
        Ok(())
    }

    /// Drop and recreate the collection, discarding every point.
    pub async fn reset_collection(&self, collection: &str, dim: usize) -> Result<()> {
        let exists = self
            .client
            .collection_exists(collection)
            .await
            .context("Failed to check collection")?;
        if exists {
            self.client
                .delete_collection(collection)
                .await
                .context("Failed to delete collection")?;
            debug!(collection, "Dropped Qdrant collection");
        }
        self.ensure_collection(collection, dim).await
    }

    pub async fn upsert_batch(&self, collection: &str, points: Vec<VectorPoint>) -> Result<usize> {
        if points.is_empty() {
            return Ok(0);
        }
        let count = points.len();
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| PointStruct::new(point_id(&p.id), p.vector, json_to_payload(&p.payload)))
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(collection, points).wait(true))
            .await
            .context("Failed to upsert points")?;

        debug!(collection, count, "Upserted vectors");
        Ok(count)
    }

    /// Nearest points to `query_vector`, best first.
    pub async fn search(&self, collection: &str, query_vector: Vec<f32>, top_k: u64) -> Result<Vec<VectorSearchResult>> {
        let response = self
            .client
            .search_points(SearchPointsBuilder::new(collection, query_vector, top_k).with_payload(true))
            .await
            .context("Failed to search points")?;

        Ok(response
            .result
            .into_iter()
            .map(|point| VectorSearchResult {
                score: point.score,
                payload: payload_to_json(&point.payload),
            })
            .collect())
    }

    pub async fn count(&self, collection: &str) -> Result<u64> {
        let info = self
            .client
            .collection_info(collection)
            .await
            .context("Failed to get collection info")?;

        Ok(info.result.and_then(|r| r.points_count).unwrap_or(0))
    }
}

/// Stable point id for a node id. Qdrant only accepts integers and UUIDs.
pub fn point_id(id: &str) -> String {
    match Uuid::parse_str(id) {
        Ok(uuid) => uuid.to_string(),
        Err(_) => Uuid::new_v5(&Uuid::NAMESPACE_OID, id.as_bytes()).to_string(),
    }
}

fn json_to_payload(json: &serde_json::Map<String, serde_json::Value>) -> HashMap<String, Value> {
    json.iter()
        .filter_map(|(key, val)| json_value_to_qdrant(val).map(|v| (key.clone(), v)))
        .collect()
}

fn json_value_to_qdrant(val: &serde_json::Value) -> Option<Value> {
    let kind = match val {
        serde_json::Value::String(s) => Kind::StringValue(s.clone()),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64()?),
        },
        serde_json::Value::Bool(b) => Kind::BoolValue(*b),
        _ => return None,
    };
    Some(Value { kind: Some(kind) })
}

fn payload_to_json(payload: &HashMap<String, Value>) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    for (key, val) in payload {
        let Some(kind) = &val.kind else {
            continue;
        };
        let json_val = match kind {
            Kind::StringValue(s) => serde_json::Value::String(s.clone()),
            Kind::DoubleValue(f) => serde_json::json!(*f),
            Kind::IntegerValue(i) => serde_json::json!(*i),
            Kind::BoolValue(b) => serde_json::Value::Bool(*b),
            _ => continue,
        };
        map.insert(key.clone(), json_val);
    }
    map
}
