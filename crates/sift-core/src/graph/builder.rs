//! Knowledge graph builder.
//!
//! A build scans every entity's source table, links rows through foreign
//! keys, scores nodes, and then replaces the persisted graph in a single
//! transaction. Entities whose scan fails are skipped and reported; only a
//! failed swap fails the build.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use sift_db::queries::graph as queries;
use sift_db::queries::rows::{self, RowRecord};
use sift_db::DbPool;

use crate::config::GraphSettings;
use crate::entity::{EntityRelationship, EntityResolver, SemanticEntity};
use crate::error::{SiftError, SiftResult};
use crate::schema::{SchemaCatalog, SchemaDefinition, TableDefinition, TableRelationship};
use super::ingest;
use super::model::{
    BuildOptions, BuildReport, BuildStats, BuildSummary, CancelFlag, EntityOutcome, GraphEdge, GraphNode,
    GraphSnapshot,
};
use super::scoring;

/// Receives freshly built nodes, e.g. to embed them into a vector store.
#[async_trait]
pub trait NodeIndexer: Send + Sync {
    /// Index the nodes, replacing any previous contents. Returns the count written.
    async fn index_nodes(&self, nodes: &[GraphNode]) -> SiftResult<usize>;
}

/// Rows of one materialized entity.
struct Materialized<'a> {
    entity: &'a SemanticEntity,
    table: TableDefinition,
    /// (node id, row) in scan order.
    rows: Vec<(String, RowRecord)>,
}

impl Materialized<'_> {
    /// Node ids keyed by the rendered value of `column`.
    fn index_by(&self, column: &str) -> HashMap<String, Vec<&str>> {
        let mut index: HashMap<String, Vec<&str>> = HashMap::new();
        for (node_id, row) in &self.rows {
            if let Some(key) = row.get(column).and_then(|v| v.as_key()) {
                index.entry(key).or_default().push(node_id.as_str());
            }
        }
        index
    }
}

/// Builds, persists and reads the knowledge graph.
pub struct KnowledgeGraph {
    pool: DbPool,
    catalog: Arc<SchemaCatalog>,
    resolver: Arc<EntityResolver>,
    settings: GraphSettings,
    indexer: Option<Arc<dyn NodeIndexer>>,
    build_lock: Arc<tokio::sync::Mutex<()>>,
}

impl KnowledgeGraph {
    pub fn new(
        pool: DbPool,
        catalog: Arc<SchemaCatalog>,
        resolver: Arc<EntityResolver>,
        settings: GraphSettings,
    ) -> Self {
        Self {
            pool,
            catalog,
            resolver,
            settings,
            indexer: None,
            build_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn with_indexer(mut self, indexer: Arc<dyn NodeIndexer>) -> Self {
        self.indexer = Some(indexer);
        self
    }

    pub fn is_building(&self) -> bool {
        self.build_lock.try_lock().is_err()
    }

    /// Rebuild the whole graph. A second build while one runs is rejected.
    ///
    /// Scanning and the swap run on the blocking pool. The build lock travels
    /// with that work, so a caller that stops waiting does not free the lock
    /// while a swap is still pending.
    pub async fn build(&self, options: BuildOptions, cancel: &CancelFlag) -> SiftResult<BuildReport> {
        let guard = Arc::clone(&self.build_lock)
            .try_lock_owned()
            .map_err(|_| SiftError::BuildInProgress)?;

        let started = Instant::now();
        let build_id = Uuid::new_v4().to_string();
        info!(build = %build_id, "Knowledge graph build started");

        let pass = BuildPass {
            pool: self.pool.clone(),
            catalog: self.catalog.clone(),
            resolver: self.resolver.clone(),
            settings: self.settings.clone(),
        };
        let (id, flag) = (build_id.clone(), cancel.clone());
        let (_guard, built) = tokio::task::spawn_blocking(move || (guard, pass.run(&id, &flag)))
            .await
            .map_err(|e| SiftError::BuildFailure(format!("build task failed: {}", e)))?;
        let Built { nodes, stats, outcomes } = built?;

        let (embedded_nodes, embedding_error) = if options.generate_embeddings {
            self.embed(&nodes).await
        } else {
            (None, None)
        };

        Ok(BuildReport {
            build_id,
            stats,
            outcomes,
            embedded_nodes,
            embedding_error,
            elapsed_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn embed(&self, nodes: &[GraphNode]) -> (Option<usize>, Option<String>) {
        let Some(indexer) = &self.indexer else {
            return (None, Some("no node indexer configured".to_string()));
        };
        match indexer.index_nodes(nodes).await {
            Ok(count) => {
                info!(nodes = count, "Graph nodes embedded");
                (Some(count), None)
            }
            Err(e) => {
                warn!(error = %e, "Embedding generation failed");
                (None, Some(e.to_string()))
            }
        }
    }

    /// Stats of the persisted graph, without rebuilding.
    pub fn get_stats(&self) -> SiftResult<BuildStats> {
        let nodes = queries::count_nodes_by_type(&self.pool)?;
        let edges = queries::count_edges_by_type(&self.pool)?;
        Ok(BuildStats::from_counts(
            nodes.into_iter().map(|(t, n)| (t, n as usize)).collect(),
            edges.into_iter().map(|(t, n)| (t, n as usize)).collect(),
        ))
    }

    /// The `limit` most important nodes and the edges among them.
    pub fn snapshot(&self, limit: usize) -> SiftResult<GraphSnapshot> {
        let nodes: Vec<GraphNode> = queries::list_nodes(&self.pool, limit)?
            .into_iter()
            .map(GraphNode::from_row)
            .collect();
        let ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        let edges = queries::list_edges(&self.pool)?
            .into_iter()
            .filter(|e| ids.contains(e.source_id.as_str()) && ids.contains(e.target_id.as_str()))
            .map(GraphEdge::from_row)
            .collect();
        Ok(GraphSnapshot { nodes, edges })
    }

    pub fn get_node(&self, id: &str) -> SiftResult<Option<GraphNode>> {
        match queries::get_node(&self.pool, id) {
            Ok(row) => Ok(Some(GraphNode::from_row(row))),
            Err(sift_db::DbError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Adjacent nodes in either direction, most important first.
    pub fn neighbors(&self, id: &str) -> SiftResult<Vec<(GraphEdge, GraphNode)>> {
        Ok(queries::neighbors(&self.pool, id)?
            .into_iter()
            .map(|(e, n)| (GraphEdge::from_row(e), GraphNode::from_row(n)))
            .collect())
    }

    pub fn latest_build(&self) -> SiftResult<Option<BuildSummary>> {
        Ok(queries::latest_build(&self.pool)?.map(BuildSummary::from_row))
    }
}

/// Output of the synchronous half of a build.
struct Built {
    nodes: Vec<GraphNode>,
    stats: BuildStats,
    outcomes: Vec<EntityOutcome>,
}

/// Scan, link, score and swap. Everything here touches the store directly.
struct BuildPass {
    pool: DbPool,
    catalog: Arc<SchemaCatalog>,
    resolver: Arc<EntityResolver>,
    settings: GraphSettings,
}

impl BuildPass {
    fn run(&self, build_id: &str, cancel: &CancelFlag) -> SiftResult<Built> {
        let started_at = chrono::Utc::now();
        let schema = self.catalog.get_schema()?;
        let entities = self.resolver.get_all_entities()?;

        let mut outcomes = Vec::with_capacity(entities.len());
        let mut materialized: Vec<Materialized<'_>> = Vec::new();
        let mut nodes: Vec<GraphNode> = Vec::new();

        for entity in &entities {
            if cancel.is_cancelled() {
                warn!(build = %build_id, "Knowledge graph build cancelled");
                return Err(SiftError::BuildCancelled);
            }
            match self.scan_entity(&schema, entity) {
                Ok((m, entity_nodes)) => {
                    debug!(entity = %entity.name, nodes = entity_nodes.len(), "Entity materialized");
                    outcomes.push(EntityOutcome::Success {
                        entity: entity.name.clone(),
                        nodes: entity_nodes.len(),
                    });
                    nodes.extend(entity_nodes);
                    materialized.push(m);
                }
                Err(reason) => {
                    warn!(entity = %entity.name, reason = %reason, "Entity skipped");
                    outcomes.push(EntityOutcome::Skipped {
                        entity: entity.name.clone(),
                        reason,
                    });
                }
            }
        }

        let edges = self.link(&schema, &materialized, &nodes);
        score_nodes(&mut nodes, &edges, &materialized, &self.settings);

        if cancel.is_cancelled() {
            warn!(build = %build_id, "Knowledge graph build cancelled before swap");
            return Err(SiftError::BuildCancelled);
        }

        let stats = stats_of(&nodes, &edges);
        self.swap(build_id, started_at, &nodes, &edges, &outcomes)?;
        info!(
            build = %build_id,
            nodes = stats.total_nodes,
            edges = stats.total_edges,
            skipped = outcomes.iter().filter(|o| o.is_skipped()).count(),
            "Knowledge graph replaced"
        );

        Ok(Built { nodes, stats, outcomes })
    }

    fn scan_entity<'a>(
        &self,
        schema: &SchemaDefinition,
        entity: &'a SemanticEntity,
    ) -> Result<(Materialized<'a>, Vec<GraphNode>), String> {
        let table = schema
            .table(&entity.source_table)
            .cloned()
            .ok_or_else(|| format!("source table '{}' not found", entity.source_table))?;

        let records = rows::scan_rows(
            &self.pool,
            &table.name,
            &table.primary_key,
            self.settings.max_rows_per_entity,
        )
        .map_err(|e| e.to_string())?;

        let mut nodes = Vec::with_capacity(records.len());
        let mut kept = Vec::with_capacity(records.len());
        for record in records {
            match ingest::to_node(entity, &record, &table.primary_key, &self.settings.label_fields) {
                Some(node) => {
                    kept.push((node.id.clone(), record));
                    nodes.push(node);
                }
                None => debug!(entity = %entity.name, "Row without identity skipped"),
            }
        }

        Ok((
            Materialized {
                entity,
                table,
                rows: kept,
            },
            nodes,
        ))
    }

    /// Edges for every relationship whose target entity was materialized.
    fn link(&self, schema: &SchemaDefinition, materialized: &[Materialized<'_>], nodes: &[GraphNode]) -> Vec<GraphEdge> {
        let by_name: HashMap<&str, &Materialized<'_>> =
            materialized.iter().map(|m| (m.entity.name.as_str(), m)).collect();
        let node_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();

        let mut seen: HashSet<(String, String, String)> = HashSet::new();
        let mut edges = Vec::new();

        for source in materialized {
            for relationship in &source.entity.relationships {
                let Some(target) = by_name.get(relationship.target.as_str()) else {
                    debug!(
                        entity = %source.entity.name,
                        target = %relationship.target,
                        "Relationship target not materialized"
                    );
                    continue;
                };

                let weight = scoring::edge_weight(relationship, &self.settings.relationship_weights);
                for (from, to) in self.pairs(schema, source, target, relationship) {
                    // Both endpoints must belong to this build.
                    if !node_ids.contains(from.as_str()) || !node_ids.contains(to.as_str()) {
                        continue;
                    }
                    if seen.insert((from.clone(), to.clone(), relationship.kind.clone())) {
                        edges.push(GraphEdge {
                            source_id: from,
                            target_id: to,
                            relationship_type: relationship.kind.clone(),
                            weight,
                        });
                    }
                }
            }
        }
        edges
    }

    /// Node pairs linked by a relationship, resolved through foreign-key values.
    fn pairs(
        &self,
        schema: &SchemaDefinition,
        source: &Materialized<'_>,
        target: &Materialized<'_>,
        relationship: &EntityRelationship,
    ) -> Vec<(String, String)> {
        let Some(path) = schema.join_path(&source.table.name, &target.table.name) else {
            debug!(
                entity = %source.entity.name,
                target = %relationship.target,
                "No join path between source tables"
            );
            return Vec::new();
        };

        match path.as_slice() {
            // Two entities over the same table: rows pair with themselves.
            [] => same_rows(source, target),
            [hop] => {
                let (Some(source_col), Some(target_col)) =
                    (hop.column_on(&source.table.name), hop.column_on(&target.table.name))
                else {
                    return Vec::new();
                };
                join_on(source, source_col, target, target_col)
            }
            [first, second] => self.pairs_through(source, target, first, second),
            _ => {
                debug!(
                    entity = %source.entity.name,
                    target = %relationship.target,
                    hops = path.len(),
                    "Join path too long to materialize"
                );
                Vec::new()
            }
        }
    }

    /// Pairs linked through a junction table (`source <- junction -> target`).
    fn pairs_through(
        &self,
        source: &Materialized<'_>,
        target: &Materialized<'_>,
        first: &TableRelationship,
        second: &TableRelationship,
    ) -> Vec<(String, String)> {
        let junction = if first.from_table == source.table.name { &first.to_table } else { &first.from_table };
        let (Some(source_col), Some(junction_source_col), Some(junction_target_col), Some(target_col)) = (
            first.column_on(&source.table.name),
            first.column_on(junction),
            second.column_on(junction),
            second.column_on(&target.table.name),
        ) else {
            return Vec::new();
        };

        let links = match rows::scan_rows(&self.pool, junction, &[], self.settings.max_rows_per_entity) {
            Ok(links) => links,
            Err(e) => {
                warn!(table = %junction, error = %e, "Junction scan failed, relationship skipped");
                return Vec::new();
            }
        };

        let source_index = source.index_by(source_col);
        let target_index = target.index_by(target_col);
        let mut pairs = Vec::new();
        for link in &links {
            let (Some(s), Some(t)) = (
                link.get(junction_source_col).and_then(|v| v.as_key()),
                link.get(junction_target_col).and_then(|v| v.as_key()),
            ) else {
                continue;
            };
            for from in source_index.get(&s).into_iter().flatten() {
                for to in target_index.get(&t).into_iter().flatten() {
                    pairs.push((from.to_string(), to.to_string()));
                }
            }
        }
        pairs
    }

    fn swap(
        &self,
        build_id: &str,
        started_at: chrono::DateTime<chrono::Utc>,
        nodes: &[GraphNode],
        edges: &[GraphEdge],
        outcomes: &[EntityOutcome],
    ) -> SiftResult<()> {
        let node_rows = nodes.iter().map(GraphNode::to_row).collect::<SiftResult<Vec<_>>>()?;
        let edge_rows: Vec<_> = edges.iter().map(GraphEdge::to_row).collect();
        let skipped: Vec<&EntityOutcome> = outcomes.iter().filter(|o| o.is_skipped()).collect();

        let build = queries::BuildRow {
            id: build_id.to_string(),
            started_at: started_at.to_rfc3339(),
            finished_at: chrono::Utc::now().to_rfc3339(),
            total_nodes: node_rows.len() as i64,
            total_edges: edge_rows.len() as i64,
            skipped_entities: serde_json::to_string(&skipped)?,
        };

        queries::replace_graph(&self.pool, &build, &node_rows, &edge_rows).map_err(|e| {
            warn!(build = %build_id, error = %e, "Graph swap failed, previous graph kept");
            SiftError::BuildFailure(e.to_string())
        })
    }
}

fn join_on(
    source: &Materialized<'_>,
    source_col: &str,
    target: &Materialized<'_>,
    target_col: &str,
) -> Vec<(String, String)> {
    let target_index = target.index_by(target_col);
    let mut pairs = Vec::new();
    for (from, row) in &source.rows {
        let Some(key) = row.get(source_col).and_then(|v| v.as_key()) else {
            continue;
        };
        for to in target_index.get(&key).into_iter().flatten() {
            pairs.push((from.clone(), to.to_string()));
        }
    }
    pairs
}

/// Pairs of nodes built from the same row of a shared table.
fn same_rows(source: &Materialized<'_>, target: &Materialized<'_>) -> Vec<(String, String)> {
    let target_ids: HashSet<&str> = target.rows.iter().map(|(id, _)| id.as_str()).collect();
    let prefix = format!("{}:", source.entity.name);
    source
        .rows
        .iter()
        .filter_map(|(from, _)| {
            let row_id = from.strip_prefix(&prefix)?;
            let to = GraphNode::node_id(&target.entity.name, row_id);
            target_ids.contains(to.as_str()).then(|| (from.clone(), to))
        })
        .collect()
}

fn score_nodes(nodes: &mut [GraphNode], edges: &[GraphEdge], materialized: &[Materialized<'_>], settings: &GraphSettings) {
    let mut degree: HashMap<&str, usize> = HashMap::new();
    for edge in edges {
        *degree.entry(edge.source_id.as_str()).or_default() += 1;
        *degree.entry(edge.target_id.as_str()).or_default() += 1;
    }

    let entities: HashMap<&str, &SemanticEntity> =
        materialized.iter().map(|m| (m.entity.name.as_str(), m.entity)).collect();

    let magnitudes: Vec<f64> = nodes
        .iter()
        .map(|n| {
            entities
                .get(n.node_type.as_str())
                .map(|e| scoring::magnitude(n, e))
                .unwrap_or(0.0)
        })
        .collect();
    let mut max_by_type: HashMap<&str, f64> = HashMap::new();
    for (node, &m) in nodes.iter().zip(&magnitudes) {
        let max = max_by_type.entry(node.node_type.as_str()).or_insert(0.0);
        *max = max.max(m);
    }

    let scores: Vec<f64> = nodes
        .iter()
        .zip(&magnitudes)
        .map(|(node, &m)| {
            let weight = settings
                .entity_weights
                .get(&node.node_type)
                .copied()
                .or_else(|| entities.get(node.node_type.as_str()).map(|e| e.weight))
                .unwrap_or(1.0);
            let d = degree.get(node.id.as_str()).copied().unwrap_or(0);
            let max = max_by_type.get(node.node_type.as_str()).copied().unwrap_or(0.0);
            scoring::importance(weight, d, m, max)
        })
        .collect();

    for (node, score) in nodes.iter_mut().zip(scores) {
        node.importance_score = score;
    }
}

fn stats_of(nodes: &[GraphNode], edges: &[GraphEdge]) -> BuildStats {
    let mut nodes_by_type = BTreeMap::new();
    for node in nodes {
        *nodes_by_type.entry(node.node_type.clone()).or_insert(0) += 1;
    }
    let mut edges_by_type = BTreeMap::new();
    for edge in edges {
        *edges_by_type.entry(edge.relationship_type.clone()).or_insert(0) += 1;
    }
    BuildStats::from_counts(nodes_by_type, edges_by_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::testing;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn graph_with(pool: DbPool, settings: GraphSettings) -> KnowledgeGraph {
        let clock = Arc::new(ManualClock::new());
        let catalog = Arc::new(SchemaCatalog::new(pool.clone(), Duration::from_secs(600), clock.clone()));
        let resolver = Arc::new(EntityResolver::new(pool.clone(), catalog.clone(), Duration::from_secs(300), clock));
        KnowledgeGraph::new(pool, catalog, resolver, settings)
    }

    fn graph() -> KnowledgeGraph {
        graph_with(testing::seeded_pool(), GraphSettings::default())
    }

    #[tokio::test]
    async fn test_build_materializes_entities() {
        let graph = graph();
        let report = graph.build(BuildOptions::default(), &CancelFlag::new()).await.unwrap();

        assert_eq!(report.stats.nodes_by_type["customer"], 3);
        assert_eq!(report.stats.nodes_by_type["order"], 3);
        assert_eq!(report.stats.nodes_by_type["product"], 2);
        assert_eq!(report.stats.nodes_by_type["tag"], 2);
        assert_eq!(report.stats.total_nodes, 10);

        // customer HAS_MANY order, order BELONGS_TO customer, product TAGGED tag via product_tags.
        assert_eq!(report.stats.edges_by_type["HAS_MANY"], 3);
        assert_eq!(report.stats.edges_by_type["BELONGS_TO"], 3);
        assert_eq!(report.stats.edges_by_type["TAGGED"], 3);
        assert!(report.skipped().next().is_none());
        assert_eq!(report.embedded_nodes, None);

        let acme = graph.get_node("customer:1").unwrap().unwrap();
        assert_eq!(acme.name, "Acme Corp");
        assert_eq!(acme.source_table.as_deref(), Some("customers"));
        assert!(!acme.properties.contains_key("name"));
    }

    #[tokio::test]
    async fn test_edges_point_at_built_nodes() {
        let graph = graph();
        graph.build(BuildOptions::default(), &CancelFlag::new()).await.unwrap();

        let snapshot = graph.snapshot(1_000).unwrap();
        let ids: HashSet<&str> = snapshot.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(snapshot.edges.len(), 9);
        for edge in &snapshot.edges {
            assert!(ids.contains(edge.source_id.as_str()));
            assert!(ids.contains(edge.target_id.as_str()));
        }

        let has_many: Vec<_> = snapshot
            .edges
            .iter()
            .filter(|e| e.relationship_type == "HAS_MANY" && e.source_id == "customer:1")
            .map(|e| e.target_id.as_str())
            .collect();
        assert_eq!(has_many, vec!["order:10", "order:11"]);

        let tagged = snapshot.edges.iter().find(|e| e.relationship_type == "TAGGED").unwrap();
        assert_eq!(tagged.weight, 0.5);
    }

    #[tokio::test]
    async fn test_rebuild_is_idempotent() {
        let graph = graph();
        let first = graph.build(BuildOptions::default(), &CancelFlag::new()).await.unwrap();
        let second = graph.build(BuildOptions::default(), &CancelFlag::new()).await.unwrap();
        assert_eq!(first.stats.total_nodes, second.stats.total_nodes);
        assert_eq!(first.stats.total_edges, second.stats.total_edges);
        assert_ne!(first.build_id, second.build_id);
        assert_eq!(graph.get_stats().unwrap(), second.stats);
        assert_eq!(graph.latest_build().unwrap().unwrap().id, second.build_id);
    }

    #[tokio::test]
    async fn test_importance_scores() {
        let graph = graph();
        graph.build(BuildOptions::default(), &CancelFlag::new()).await.unwrap();
        let snapshot = graph.snapshot(1_000).unwrap();
        assert!(snapshot.nodes.iter().all(|n| (0.0..=1.0).contains(&n.importance_score)));

        let score = |id: &str| graph.get_node(id).unwrap().unwrap().importance_score;
        // More orders, more lifetime value, same entity weight.
        assert!(score("customer:1") > score("customer:2"));
        assert!(score("customer:2") > score("customer:3"));
        // Most important node comes first in a snapshot.
        assert_eq!(snapshot.nodes[0].id, "customer:1");
    }

    #[tokio::test]
    async fn test_configured_entity_weight_raises_scores() {
        let pool = testing::seeded_pool();
        let plain = graph_with(pool.clone(), GraphSettings::default());
        plain.build(BuildOptions::default(), &CancelFlag::new()).await.unwrap();
        let before = plain.get_node("tag:1").unwrap().unwrap().importance_score;

        let mut settings = GraphSettings::default();
        settings.entity_weights.insert("tag".to_string(), 5.0);
        let weighted = graph_with(pool, settings);
        weighted.build(BuildOptions::default(), &CancelFlag::new()).await.unwrap();
        assert!(weighted.get_node("tag:1").unwrap().unwrap().importance_score > before);
    }

    #[tokio::test]
    async fn test_missing_table_is_skipped() {
        let pool = testing::seeded_pool();
        sift_db::queries::entities::upsert_entity(
            &pool, "invoice", "Invoice", None, "invoices", None, "[]", r#"[{"target":"customer","kind":"BILLS"}]"#, 1.0,
        )
        .unwrap();
        let graph = graph_with(pool, GraphSettings::default());
        let report = graph.build(BuildOptions::default(), &CancelFlag::new()).await.unwrap();

        let skipped: Vec<&str> = report.skipped().map(|o| o.entity()).collect();
        assert_eq!(skipped, vec!["invoice"]);
        assert_eq!(report.stats.total_nodes, 10);
        assert_eq!(graph.latest_build().unwrap().unwrap().skipped.len(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_build_keeps_previous_graph() {
        let graph = graph();
        graph.build(BuildOptions::default(), &CancelFlag::new()).await.unwrap();
        let before = graph.get_stats().unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = graph.build(BuildOptions::default(), &cancel).await.unwrap_err();
        assert!(matches!(err, SiftError::BuildCancelled));
        assert_eq!(graph.get_stats().unwrap(), before);
    }

    #[tokio::test]
    async fn test_concurrent_build_rejected() {
        let graph = graph();
        let _held = graph.build_lock.try_lock().unwrap();
        assert!(graph.is_building());
        let err = graph.build(BuildOptions::default(), &CancelFlag::new()).await.unwrap_err();
        assert!(matches!(err, SiftError::BuildInProgress));
    }

    #[tokio::test]
    async fn test_build_leaves_runtime_free_while_store_is_busy() {
        let pool = testing::seeded_pool();
        let graph = graph_with(pool.clone(), GraphSettings::default());

        let (locked_tx, locked_rx) = std::sync::mpsc::channel();
        let holder = std::thread::spawn(move || {
            pool.with_conn(|_| {
                let _ = locked_tx.send(());
                std::thread::sleep(Duration::from_millis(500));
                Ok(())
            })
            .unwrap();
        });
        locked_rx.recv().unwrap();

        let started = Instant::now();
        let ticker = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            started.elapsed()
        };
        let cancel = CancelFlag::new();
        let (report, ticked) = tokio::join!(graph.build(BuildOptions::default(), &cancel), ticker);

        // The ticker fires while the build still waits on the connection.
        assert!(ticked < Duration::from_millis(400));
        assert_eq!(report.unwrap().stats.total_nodes, 10);
        holder.join().unwrap();
    }

    struct CountingIndexer(AtomicUsize);

    #[async_trait]
    impl NodeIndexer for CountingIndexer {
        async fn index_nodes(&self, nodes: &[GraphNode]) -> SiftResult<usize> {
            self.0.fetch_add(nodes.len(), Ordering::SeqCst);
            Ok(nodes.len())
        }
    }

    struct FailingIndexer;

    #[async_trait]
    impl NodeIndexer for FailingIndexer {
        async fn index_nodes(&self, _nodes: &[GraphNode]) -> SiftResult<usize> {
            Err(SiftError::BackendUnavailable("qdrant down".into()))
        }
    }

    #[tokio::test]
    async fn test_embeddings_after_swap() {
        let indexer = Arc::new(CountingIndexer(AtomicUsize::new(0)));
        let graph = graph().with_indexer(indexer.clone());
        let options = BuildOptions {
            generate_embeddings: true,
        };
        let report = graph.build(options, &CancelFlag::new()).await.unwrap();
        assert_eq!(report.embedded_nodes, Some(10));
        assert_eq!(indexer.0.load(Ordering::SeqCst), 10);

        let failing = graph_with(testing::seeded_pool(), GraphSettings::default()).with_indexer(Arc::new(FailingIndexer));
        let report = failing.build(options, &CancelFlag::new()).await.unwrap();
        assert!(report.embedding_error.unwrap().contains("qdrant down"));
        assert_eq!(failing.get_stats().unwrap().total_nodes, 10);
    }

    #[tokio::test]
    async fn test_neighbors() {
        let graph = graph();
        graph.build(BuildOptions::default(), &CancelFlag::new()).await.unwrap();
        let neighbors = graph.neighbors("tag:2").unwrap();
        let ids: Vec<&str> = neighbors.iter().map(|(_, n)| n.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"product:100") && ids.contains(&"product:101"));
        assert!(graph.neighbors("nope").unwrap().is_empty());
        assert!(graph.get_node("nope").unwrap().is_none());
    }
}
