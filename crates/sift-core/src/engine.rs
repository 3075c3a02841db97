//! Engine facade wiring the catalog, resolver, graph and retriever together.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use sift_db::DbPool;

use crate::cache::{Clock, SystemClock};
use crate::config::SiftConfig;
use crate::entity::{EntityResolver, ResolvedEntity};
use crate::error::SiftResult;
use crate::graph::{BuildOptions, BuildReport, BuildStats, CancelFlag, KnowledgeGraph, NodeIndexer};
use crate::retrieval::{
    InternalBackend, SearchBackend, SearchRequest, SearchResponse, StructuredQuery, StructuredResult,
    UnifiedRetriever, VectorIndex,
};
use crate::schema::SchemaCatalog;

/// Optional network-backed collaborators.
#[derive(Default, Clone)]
pub struct Adapters {
    pub vectors: Option<Arc<dyn VectorIndex>>,
    pub indexer: Option<Arc<dyn NodeIndexer>>,
    pub external: Option<Arc<dyn SearchBackend>>,
}

/// Owns the store and wires the catalog, resolver, graph and retriever together.
pub struct SiftEngine {
    pool: DbPool,
    config: SiftConfig,
    catalog: Arc<SchemaCatalog>,
    resolver: Arc<EntityResolver>,
    graph: KnowledgeGraph,
    retriever: UnifiedRetriever,
    running_build: Mutex<Option<CancelFlag>>,
}

impl SiftEngine {
    pub fn new(pool: DbPool, config: SiftConfig, adapters: Adapters) -> Self {
        Self::with_clock(pool, config, adapters, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: DbPool, config: SiftConfig, adapters: Adapters, clock: Arc<dyn Clock>) -> Self {
        let catalog = Arc::new(SchemaCatalog::new(
            pool.clone(),
            Duration::from_secs(config.cache.schema_ttl_secs),
            Arc::clone(&clock),
        ));
        let resolver = Arc::new(EntityResolver::new(
            pool.clone(),
            Arc::clone(&catalog),
            Duration::from_secs(config.cache.entity_ttl_secs),
            clock,
        ));

        let mut graph = KnowledgeGraph::new(
            pool.clone(),
            Arc::clone(&catalog),
            Arc::clone(&resolver),
            config.graph.clone(),
        );
        if let Some(indexer) = adapters.indexer {
            graph = graph.with_indexer(indexer);
        }

        let mut internal = InternalBackend::new(pool.clone(), Arc::clone(&catalog), Arc::clone(&resolver));
        if let Some(vectors) = adapters.vectors {
            internal = internal.with_vectors(vectors);
        }
        let mut retriever = UnifiedRetriever::new(pool.clone(), Arc::clone(&resolver), &config.retrieval)
            .with_internal(Arc::new(internal));
        if let Some(external) = adapters.external {
            retriever = retriever.with_external(external);
        }

        Self {
            pool,
            config,
            catalog,
            resolver,
            graph,
            retriever,
            running_build: Mutex::new(None),
        }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn config(&self) -> &SiftConfig {
        &self.config
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn resolver(&self) -> &EntityResolver {
        &self.resolver
    }

    pub fn graph(&self) -> &KnowledgeGraph {
        &self.graph
    }

    pub fn retriever(&self) -> &UnifiedRetriever {
        &self.retriever
    }

    /// Ground free text in known entities. Lookup failures yield no entities.
    pub fn extract_entities(&self, query: &str) -> Vec<ResolvedEntity> {
        self.resolver.extract_entities(query).unwrap_or_else(|e| {
            warn!(error = %e, "Entity extraction failed");
            Vec::new()
        })
    }

    pub async fn search(&self, request: &SearchRequest) -> SiftResult<SearchResponse> {
        self.retriever.search(request).await
    }

    pub fn query_structured_data(&self, request: &StructuredQuery) -> SiftResult<StructuredResult> {
        self.retriever.query_structured_data(request)
    }

    /// Rebuild the knowledge graph. The build can be stopped with [`Self::cancel_build`].
    pub async fn build_graph(&self, options: BuildOptions) -> SiftResult<BuildReport> {
        let cancel = CancelFlag::new();
        if let Ok(mut running) = self.running_build.lock() {
            if !self.graph.is_building() {
                *running = Some(cancel.clone());
            }
        }

        let report = self.graph.build(options, &cancel).await;

        if let Ok(mut running) = self.running_build.lock() {
            if running.as_ref().is_some_and(|flag| flag.same_as(&cancel)) {
                *running = None;
            }
        }
        report
    }

    /// Signal the running build, if any, to stop. Returns whether one was running.
    pub fn cancel_build(&self) -> bool {
        let Ok(running) = self.running_build.lock() else {
            return false;
        };
        match running.as_ref() {
            Some(flag) => {
                info!("Cancelling knowledge graph build");
                flag.cancel();
                true
            }
            None => false,
        }
    }

    pub fn graph_stats(&self) -> SiftResult<BuildStats> {
        self.graph.get_stats()
    }

    /// Drop cached schema and entity views.
    pub fn refresh(&self) {
        self.catalog.clear_cache();
        self.resolver.clear_cache();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::error::SiftError;
    use crate::testing;

    fn engine() -> SiftEngine {
        SiftEngine::with_clock(
            testing::seeded_pool(),
            SiftConfig::default(),
            Adapters::default(),
            Arc::new(ManualClock::new()),
        )
    }

    #[test]
    fn test_extract_entities() {
        let found = engine().extract_entities("show every client purchase");
        let names: Vec<&str> = found.iter().map(|r| r.entity.name.as_str()).collect();
        assert_eq!(names, vec!["customer", "order"]);
    }

    #[tokio::test]
    async fn test_hybrid_search_without_vectors_degrades() {
        let engine = engine();
        let response = engine.search(&SearchRequest::new("acme")).await.unwrap();
        assert_eq!(response.results[0].id, "customer:1");
        // The semantic half has no vector index to ask.
        assert_eq!(response.degraded_backends, vec!["internal"]);
    }

    #[tokio::test]
    async fn test_keyword_search_is_clean() {
        let engine = engine();
        let request = SearchRequest::new("widget").with_mode(crate::retrieval::SearchMode::Keyword);
        let response = engine.search(&request).await.unwrap();
        assert_eq!(response.results.len(), 2);
        assert!(!response.is_degraded());
    }

    #[test]
    fn test_structured_query_needs_permission() {
        let err = engine()
            .query_structured_data(&StructuredQuery {
                query: "SELECT 1".into(),
                ..StructuredQuery::default()
            })
            .unwrap_err();
        assert!(matches!(err, SiftError::PermissionDenied { .. }));
    }

    #[tokio::test]
    async fn test_build_and_stats() {
        let engine = engine();
        assert!(!engine.cancel_build());
        let report = engine.build_graph(BuildOptions::default()).await.unwrap();
        assert_eq!(report.stats.total_nodes, 10);

        let stats = engine.graph_stats().unwrap();
        assert_eq!(stats.total_nodes, 10);
        assert_eq!(stats.total_edges, 9);
        assert!(!engine.cancel_build());
    }
}
