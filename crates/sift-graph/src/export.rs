//! Full export of a knowledge graph snapshot into Neo4j.
//!
//! Every node becomes `(:SiftNode:<Type> {id, type, name, ...})` and every
//! edge a relationship named after its kind. The previous export is removed
//! first so Neo4j mirrors the last successful build.

use anyhow::{Context, Result};
use neo4rs::Query;
use std::time::Instant;
use tracing::{debug, info};

use sift_core::graph::{GraphEdge, GraphNode, GraphSnapshot};

use crate::GraphClient;

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExportResult {
    pub nodes: usize,
    pub relationships: usize,
    pub removed: usize,
}

pub async fn export_graph(client: &GraphClient, snapshot: &GraphSnapshot) -> Result<ExportResult> {
    let started = Instant::now();
    let mut result = ExportResult {
        removed: clear_previous(client).await?,
        ..ExportResult::default()
    };

    for node in &snapshot.nodes {
        client
            .execute(node_query(node)?)
            .await
            .with_context(|| format!("Failed to export node {}", node.id))?;
        result.nodes += 1;
    }

    for edge in &snapshot.edges {
        client
            .execute(edge_query(edge))
            .await
            .with_context(|| format!("Failed to export edge {} -> {}", edge.source_id, edge.target_id))?;
        result.relationships += 1;
    }

    info!(
        nodes = result.nodes,
        relationships = result.relationships,
        removed = result.removed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Knowledge graph exported to Neo4j"
    );
    Ok(result)
}

async fn clear_previous(client: &GraphClient) -> Result<usize> {
    let query = Query::new("MATCH (n:SiftNode) DETACH DELETE n RETURN count(n) AS removed".to_string());
    let removed: i64 = client.query_scalar(query, "removed").await?.unwrap_or(0);
    debug!(removed, "Cleared previous export");
    Ok(removed.max(0) as usize)
}

fn node_query(node: &GraphNode) -> Result<Query> {
    let properties = serde_json::to_string(&node.properties).context("Failed to encode node properties")?;
    let cypher = format!(
        "MERGE (n:SiftNode {{id: $id}})
         SET n:{label},
             n.type = $type,
             n.name = $name,
             n.importance = $importance,
             n.source_table = $source_table,
             n.source_id = $source_id,
             n.content = $content,
             n.properties = $properties",
        label = node_label(&node.node_type)
    );

    Ok(Query::new(cypher)
        .param("id", node.id.as_str())
        .param("type", node.node_type.as_str())
        .param("name", node.name.as_str())
        .param("importance", node.importance_score)
        .param("source_table", node.source_table.as_deref().unwrap_or(""))
        .param("source_id", node.source_id.as_deref().unwrap_or(""))
        .param("content", node.describe())
        .param("properties", properties))
}

fn edge_query(edge: &GraphEdge) -> Query {
    let cypher = format!(
        "MATCH (a:SiftNode {{id: $source}}), (b:SiftNode {{id: $target}})
         MERGE (a)-[r:{kind}]->(b)
         SET r.weight = $weight",
        kind = relationship_type(&edge.relationship_type)
    );
    Query::new(cypher)
        .param("source", edge.source_id.as_str())
        .param("target", edge.target_id.as_str())
        .param("weight", edge.weight)
}

/// `order_item` -> `OrderItem`. Labels cannot be parameters, so only
/// ASCII alphanumerics survive.
pub fn node_label(node_type: &str) -> String {
    let mut label = String::with_capacity(node_type.len());
    for word in node_type.split(|c: char| !c.is_ascii_alphanumeric()).filter(|w| !w.is_empty()) {
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            label.push(first.to_ascii_uppercase());
            label.extend(chars);
        }
    }
    match label.chars().next() {
        Some(c) if c.is_ascii_alphabetic() => label,
        Some(_) => format!("N{}", label),
        None => "Entity".to_string(),
    }
}

/// `has many` -> `HAS_MANY`.
pub fn relationship_type(kind: &str) -> String {
    let words: Vec<String> = kind
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase())
        .collect();
    match words.first() {
        None => "RELATED_TO".to_string(),
        Some(first) if first.starts_with(|c: char| c.is_ascii_digit()) => format!("R_{}", words.join("_")),
        Some(_) => words.join("_"),
    }
}
