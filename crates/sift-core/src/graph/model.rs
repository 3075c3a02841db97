//! Knowledge graph models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sift_db::queries::graph::{BuildRow, EdgeRow, NodeRow};

use crate::error::SiftResult;

/// A scalar node property.
///
/// Serialized untagged, so the persisted JSON is a plain object. Timestamps
/// are written as RFC 3339 strings and read back as timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    Timestamp(DateTime<Utc>),
    String(String),
}

impl PropertyValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Number(n) => write!(f, "{}", n),
            Self::Timestamp(t) => write!(f, "{}", t.to_rfc3339()),
            Self::String(s) => f.write_str(s),
        }
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// A node materialized from one entity row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// `{type}:{source_id}`.
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub name: String,
    pub properties: Properties,
    pub importance_score: f64,
    pub source_table: Option<String>,
    pub source_id: Option<String>,
}

impl GraphNode {
    pub fn node_id(node_type: &str, source_id: &str) -> String {
        format!("{}:{}", node_type, source_id)
    }

    pub fn from_row(row: NodeRow) -> Self {
        Self {
            properties: serde_json::from_str(&row.properties).unwrap_or_default(),
            id: row.id,
            node_type: row.node_type,
            name: row.name,
            importance_score: row.importance_score,
            source_table: row.source_table,
            source_id: row.source_id,
        }
    }

    pub fn to_row(&self) -> SiftResult<NodeRow> {
        Ok(NodeRow {
            id: self.id.clone(),
            node_type: self.node_type.clone(),
            name: self.name.clone(),
            properties: serde_json::to_string(&self.properties)?,
            importance_score: self.importance_score,
            source_table: self.source_table.clone(),
            source_id: self.source_id.clone(),
        })
    }

    /// Plain-text rendering used for embeddings and search snippets.
    pub fn describe(&self) -> String {
        let mut text = format!("{} {}", self.node_type, self.name);
        let props: Vec<String> = self
            .properties
            .iter()
            .filter(|(_, v)| !matches!(v, PropertyValue::Null))
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        if !props.is_empty() {
            text.push_str(" | ");
            text.push_str(&props.join(", "));
        }
        text
    }
}

/// A weighted, typed edge between two nodes of the same build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    pub weight: f64,
}

impl GraphEdge {
    pub fn from_row(row: EdgeRow) -> Self {
        Self {
            source_id: row.source_id,
            target_id: row.target_id,
            relationship_type: row.relationship_type,
            weight: row.weight,
        }
    }

    pub fn to_row(&self) -> EdgeRow {
        EdgeRow {
            source_id: self.source_id.clone(),
            target_id: self.target_id.clone(),
            relationship_type: self.relationship_type.clone(),
            weight: self.weight,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BuildOptions {
    #[serde(default)]
    pub generate_embeddings: bool,
}

/// Size and shape of a graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    /// Mean edges touching a node.
    pub avg_connections: f64,
    pub nodes_by_type: BTreeMap<String, usize>,
    pub edges_by_type: BTreeMap<String, usize>,
}

impl BuildStats {
    pub fn from_counts(nodes_by_type: BTreeMap<String, usize>, edges_by_type: BTreeMap<String, usize>) -> Self {
        let total_nodes = nodes_by_type.values().sum();
        let total_edges = edges_by_type.values().sum();
        let avg_connections = if total_nodes == 0 {
            0.0
        } else {
            (2 * total_edges) as f64 / total_nodes as f64
        };
        Self {
            total_nodes,
            total_edges,
            avg_connections,
            nodes_by_type,
            edges_by_type,
        }
    }
}

/// What happened to one entity during a build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntityOutcome {
    Success { entity: String, nodes: usize },
    Skipped { entity: String, reason: String },
}

impl EntityOutcome {
    pub fn entity(&self) -> &str {
        match self {
            Self::Success { entity, .. } | Self::Skipped { entity, .. } => entity,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Result of a completed build.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub build_id: String,
    pub stats: BuildStats,
    pub outcomes: Vec<EntityOutcome>,
    /// Nodes written to the vector index, when embeddings were requested.
    pub embedded_nodes: Option<usize>,
    pub embedding_error: Option<String>,
    pub elapsed_ms: u64,
}

impl BuildReport {
    pub fn skipped(&self) -> impl Iterator<Item = &EntityOutcome> {
        self.outcomes.iter().filter(|o| o.is_skipped())
    }
}

/// A persisted build, as recorded in the history table.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub id: String,
    pub started_at: String,
    pub finished_at: String,
    pub total_nodes: i64,
    pub total_edges: i64,
    pub skipped: Vec<EntityOutcome>,
}

impl BuildSummary {
    pub fn from_row(row: BuildRow) -> Self {
        Self {
            skipped: serde_json::from_str(&row.skipped_entities).unwrap_or_default(),
            id: row.id,
            started_at: row.started_at,
            finished_at: row.finished_at,
            total_nodes: row.total_nodes,
            total_edges: row.total_edges,
        }
    }
}

/// Nodes and edges for visualization.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Shared cancellation switch for a running build.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// True when both handles control the same build.
    pub fn same_as(&self, other: &CancelFlag) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_properties_json_shape() {
        let mut props = Properties::new();
        props.insert("active".into(), PropertyValue::Bool(true));
        props.insert("total".into(), PropertyValue::Number(12.5));
        props.insert("name".into(), PropertyValue::String("Acme".into()));
        props.insert(
            "since".into(),
            PropertyValue::Timestamp(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()),
        );
        props.insert("note".into(), PropertyValue::Null);

        let json = serde_json::to_value(&props).unwrap();
        assert_eq!(json["active"], serde_json::json!(true));
        assert_eq!(json["since"], serde_json::json!("2024-03-01T09:30:00Z"));

        let back: Properties = serde_json::from_value(json).unwrap();
        assert_eq!(back, props);
    }

    #[test]
    fn test_stats_from_counts() {
        let nodes = BTreeMap::from([("customer".to_string(), 3), ("order".to_string(), 3)]);
        let edges = BTreeMap::from([("HAS_MANY".to_string(), 3)]);
        let stats = BuildStats::from_counts(nodes, edges);
        assert_eq!(stats.total_nodes, 6);
        assert_eq!(stats.total_edges, 3);
        assert_eq!(stats.avg_connections, 1.0);
        assert_eq!(BuildStats::from_counts(BTreeMap::new(), BTreeMap::new()).avg_connections, 0.0);
    }

    #[test]
    fn test_describe_skips_nulls() {
        let node = GraphNode {
            id: "customer:1".into(),
            node_type: "customer".into(),
            name: "Acme".into(),
            properties: Properties::from([
                ("email".to_string(), PropertyValue::String("ops@acme.io".into())),
                ("note".to_string(), PropertyValue::Null),
            ]),
            importance_score: 0.5,
            source_table: Some("customers".into()),
            source_id: Some("1".into()),
        };
        assert_eq!(node.describe(), "customer Acme | email: ops@acme.io");
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
        assert!(flag.same_as(&clone));
        assert!(!flag.same_as(&CancelFlag::new()));
    }
}
