//! Internal backend: keyword search over entity tables, semantic search
//! through an attached vector index.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

use sift_db::queries::rows;
use sift_db::DbPool;

use crate::entity::{EntityResolver, SemanticEntity};
use crate::error::{SiftError, SiftResult};
use crate::graph::ingest;
use crate::graph::GraphNode;
use crate::schema::SchemaCatalog;
use super::backend::{BackendQuery, QueryKind, SearchBackend, VectorIndex};
use super::model::SearchResult;

pub const INTERNAL_BACKEND: &str = "internal";

/// Terms considered per query.
const MAX_TERMS: usize = 8;
const DENSITY_SHARE: f64 = 0.7;
const POSITION_SHARE: f64 = 0.3;

/// Search over the application's own tables and graph embeddings.
#[derive(Clone)]
pub struct InternalBackend {
    pool: DbPool,
    catalog: Arc<SchemaCatalog>,
    resolver: Arc<EntityResolver>,
    vectors: Option<Arc<dyn VectorIndex>>,
}

impl InternalBackend {
    pub fn new(pool: DbPool, catalog: Arc<SchemaCatalog>, resolver: Arc<EntityResolver>) -> Self {
        Self {
            pool,
            catalog,
            resolver,
            vectors: None,
        }
    }

    pub fn with_vectors(mut self, vectors: Arc<dyn VectorIndex>) -> Self {
        self.vectors = Some(vectors);
        self
    }

    /// Entities to scan: the resolved ones with searchable fields, or every
    /// searchable entity when none of the resolved ones qualify.
    fn scope(&self, resolved: &[String]) -> SiftResult<Vec<SemanticEntity>> {
        let all = self.resolver.get_all_entities()?;

        let scoped: Vec<SemanticEntity> = resolved
            .iter()
            .filter_map(|name| all.iter().find(|e| &e.name == name))
            .filter(|e| is_searchable(e))
            .cloned()
            .collect();
        if !scoped.is_empty() {
            return Ok(scoped);
        }
        Ok(all.into_iter().filter(is_searchable).collect())
    }

    fn keyword(&self, query: &BackendQuery) -> SiftResult<Vec<SearchResult>> {
        let terms = keyword_terms(&query.text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let entities = self.scope(&query.entities)?;
        let mut results = Vec::new();
        let mut failures = 0;

        for entity in &entities {
            let Some(table) = self.catalog.get_table(&entity.source_table)? else {
                debug!(entity = %entity.name, table = %entity.source_table, "Source table missing");
                continue;
            };
            let columns: Vec<String> = entity
                .searchable_fields()
                .filter_map(|f| table.column(&f.name).map(|c| c.name.clone()))
                .collect();

            let found = match rows::search_rows(
                &self.pool,
                &table.name,
                &table.primary_key,
                &columns,
                &terms,
                query.limit.saturating_mul(4),
            ) {
                Ok(found) => found,
                Err(e) => {
                    warn!(entity = %entity.name, error = %e, "Keyword scan failed");
                    failures += 1;
                    continue;
                }
            };

            for record in found {
                let Some(source_id) = ingest::source_id(&record, &table.primary_key) else {
                    continue;
                };
                let mut metadata = serde_json::Map::new();
                metadata.insert("entity".into(), entity.name.clone().into());
                metadata.insert("table".into(), table.name.clone().into());
                metadata.insert("source_id".into(), source_id.clone().into());

                let mut values = Vec::with_capacity(columns.len());
                for column in &columns {
                    if let Some(value) = record.get(column) {
                        if let Some(text) = value.as_key() {
                            values.push(text);
                        }
                        metadata.insert(column.clone(), value.to_json());
                    }
                }
                let content = values.join(" | ");
                let score = keyword_score(&content.to_lowercase(), &terms);
                if score <= 0.0 {
                    continue;
                }

                results.push(SearchResult {
                    id: GraphNode::node_id(&entity.name, &source_id),
                    content,
                    score,
                    source: INTERNAL_BACKEND.to_string(),
                    metadata: Some(metadata),
                });
            }
        }

        if failures > 0 && failures == entities.len() {
            return Err(SiftError::BackendUnavailable(format!(
                "keyword scan failed for all {} entities",
                failures
            )));
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(query.limit);
        Ok(results)
    }

    async fn semantic(&self, query: &BackendQuery) -> SiftResult<Vec<SearchResult>> {
        let Some(vectors) = &self.vectors else {
            return Err(SiftError::BackendUnavailable("no vector index attached".to_string()));
        };
        let hits = vectors.similar(&query.text, query.limit).await?;
        Ok(hits
            .into_iter()
            .map(|hit| SearchResult {
                id: hit.id,
                content: hit.content,
                score: hit.score,
                source: INTERNAL_BACKEND.to_string(),
                metadata: Some(hit.metadata),
            })
            .collect())
    }
}

#[async_trait]
impl SearchBackend for InternalBackend {
    fn name(&self) -> &str {
        INTERNAL_BACKEND
    }

    async fn search(&self, query: &BackendQuery) -> SiftResult<Vec<SearchResult>> {
        match query.kind {
            QueryKind::Keyword => {
                // Table scans hold the connection lock; keep them off the async workers.
                let (backend, query) = (self.clone(), query.clone());
                tokio::task::spawn_blocking(move || backend.keyword(&query))
                    .await
                    .map_err(|e| SiftError::BackendUnavailable(format!("keyword scan task failed: {}", e)))?
            }
            QueryKind::Semantic => self.semantic(query).await,
        }
    }
}

fn is_searchable(entity: &SemanticEntity) -> bool {
    entity.searchable_fields().next().is_some()
}

/// Lowercased, de-duplicated query terms of two or more characters.
pub fn keyword_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in text.split_whitespace() {
        let token = token
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if token.chars().count() >= 2 && !terms.contains(&token) {
            terms.push(token);
        }
        if terms.len() == MAX_TERMS {
            break;
        }
    }
    terms
}

/// Share of terms present, plus a bonus for matching early in the text.
pub fn keyword_score(text: &str, terms: &[String]) -> f64 {
    if terms.is_empty() || text.is_empty() {
        return 0.0;
    }
    let positions: Vec<usize> = terms.iter().filter_map(|t| text.find(t.as_str())).collect();
    let Some(&first) = positions.iter().min() else {
        return 0.0;
    };

    let density = positions.len() as f64 / terms.len() as f64;
    let position = 1.0 - first as f64 / text.len() as f64;
    (DENSITY_SHARE * density + POSITION_SHARE * position).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::retrieval::backend::VectorHit;
    use crate::testing;
    use std::collections::HashMap;
    use std::time::Duration;

    fn backend() -> InternalBackend {
        let pool = testing::seeded_pool();
        let clock = Arc::new(ManualClock::new());
        let catalog = Arc::new(SchemaCatalog::new(pool.clone(), Duration::from_secs(600), clock.clone()));
        let resolver = Arc::new(EntityResolver::new(pool.clone(), catalog.clone(), Duration::from_secs(300), clock));
        InternalBackend::new(pool, catalog, resolver)
    }

    fn query(text: &str, kind: QueryKind, entities: &[&str]) -> BackendQuery {
        BackendQuery {
            text: text.to_string(),
            kind,
            limit: 10,
            entities: entities.iter().map(|e| e.to_string()).collect(),
            index_name: None,
            filters: HashMap::new(),
        }
    }

    #[test]
    fn test_terms() {
        assert_eq!(keyword_terms("Acme, acme! a  Widgets?"), vec!["acme", "widgets"]);
        assert!(keyword_terms("? !").is_empty());
    }

    #[test]
    fn test_score_density_and_position() {
        let terms = vec!["steel".to_string(), "widget".to_string()];
        assert_eq!(keyword_score("steel widget", &terms), 1.0);
        let half = keyword_score("steel gear", &terms);
        assert!(half < 1.0 && half > 0.7 * 0.5);
        assert!(keyword_score("a steel gear", &terms) < half);
        assert_eq!(keyword_score("copper gear", &terms), 0.0);
    }

    #[tokio::test]
    async fn test_keyword_across_all_entities() {
        let backend = backend();
        let results = backend.search(&query("acme", QueryKind::Keyword, &[])).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "customer:1");
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[0].source, "internal");
        let metadata = results[0].metadata.as_ref().unwrap();
        assert_eq!(metadata["entity"], serde_json::json!("customer"));
        assert_eq!(metadata["email"], serde_json::json!("ops@acme.io"));
    }

    #[tokio::test]
    async fn test_keyword_scoped_to_resolved_entities() {
        let backend = backend();
        let results = backend
            .search(&query("widget products", QueryKind::Keyword, &["product"]))
            .await
            .unwrap();
        let ids: Vec<&str> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["product:100", "product:101"]);
        assert!(results[0].score > results[1].score);

        // An order entity has no row mentioning widgets.
        let results = backend.search(&query("widget", QueryKind::Keyword, &["order"])).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_without_index_is_unavailable() {
        let err = backend().search(&query("acme", QueryKind::Semantic, &[])).await.unwrap_err();
        assert!(matches!(err, SiftError::BackendUnavailable(_)));
    }

    struct FixedIndex;

    #[async_trait]
    impl VectorIndex for FixedIndex {
        async fn similar(&self, _text: &str, limit: usize) -> SiftResult<Vec<VectorHit>> {
            let hits = vec![
                VectorHit {
                    id: "product:101".into(),
                    score: 0.83,
                    content: "product Copper Gear".into(),
                    metadata: serde_json::Map::new(),
                },
                VectorHit {
                    id: "tag:2".into(),
                    score: 0.41,
                    content: "tag metal".into(),
                    metadata: serde_json::Map::new(),
                },
            ];
            Ok(hits.into_iter().take(limit).collect())
        }
    }

    #[tokio::test]
    async fn test_semantic_through_vector_index() {
        let backend = backend().with_vectors(Arc::new(FixedIndex));
        let mut q = query("gears", QueryKind::Semantic, &[]);
        q.limit = 1;
        let results = backend.search(&q).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "product:101");
        assert_eq!(results[0].source, "internal");
    }
}
