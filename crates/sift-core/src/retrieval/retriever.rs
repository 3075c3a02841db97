//! Unified retriever: access policy, backend fan-out and result merging.

use futures::future::join_all;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use sift_db::queries::{retrieval as queries, structured};
use sift_db::{DbError, DbPool};

use crate::config::RetrievalSettings;
use crate::entity::EntityResolver;
use crate::error::{SiftError, SiftResult};
use super::backend::{BackendQuery, QueryKind, SearchBackend};
use super::merge::merge_max;
use super::model::{
    RetrievalConfig, SearchBackendKind, SearchMode, SearchRequest, SearchResponse, StructuredQuery,
    StructuredResult, MAX_SEARCH_LIMIT,
};

/// Configuration loaded by [`UnifiedRetriever::load_agent_config`].
#[derive(Debug, Clone, Serialize)]
pub struct AgentContext {
    pub agent_id: String,
    pub data_source_id: Option<String>,
    pub config: RetrievalConfig,
}

/// Unified search over the configured backends, gated by per-agent retrieval config.
pub struct UnifiedRetriever {
    pool: DbPool,
    resolver: Arc<EntityResolver>,
    internal: Option<Arc<dyn SearchBackend>>,
    external: Option<Arc<dyn SearchBackend>>,
    defaults: RetrievalConfig,
    backend_timeout: Duration,
    max_structured_rows: usize,
    context: RwLock<Option<AgentContext>>,
}

impl UnifiedRetriever {
    pub fn new(pool: DbPool, resolver: Arc<EntityResolver>, settings: &RetrievalSettings) -> Self {
        Self {
            pool,
            resolver,
            internal: None,
            external: None,
            defaults: settings.default.clone(),
            backend_timeout: Duration::from_millis(settings.backend_timeout_ms),
            max_structured_rows: settings.max_structured_rows,
            context: RwLock::new(None),
        }
    }

    pub fn with_internal(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.internal = Some(backend);
        self
    }

    pub fn with_external(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.external = Some(backend);
        self
    }

    /// Resolve an agent's configuration and make it the active context for
    /// requests that do not name an agent.
    pub fn load_agent_config(&self, agent_id: &str, data_source_id: Option<&str>) -> RetrievalConfig {
        let config = self.lookup(agent_id, data_source_id);
        if let Ok(mut context) = self.context.write() {
            *context = Some(AgentContext {
                agent_id: agent_id.to_string(),
                data_source_id: data_source_id.map(String::from),
                config: config.clone(),
            });
        }
        config
    }

    pub fn active_context(&self) -> Option<AgentContext> {
        self.context.read().ok().and_then(|c| c.clone())
    }

    /// Effective configuration for a request.
    pub fn config_for(&self, agent_id: Option<&str>, data_source_id: Option<&str>) -> RetrievalConfig {
        if let Some(agent_id) = agent_id {
            return self.lookup(agent_id, data_source_id);
        }
        self.active_context()
            .map(|c| c.config)
            .unwrap_or_else(|| self.defaults.clone())
    }

    /// (agent, data source) -> (agent, default) -> configured default.
    /// An unreadable record yields the restricted default.
    fn lookup(&self, agent_id: &str, data_source_id: Option<&str>) -> RetrievalConfig {
        match queries::find_config(&self.pool, agent_id, data_source_id) {
            Ok(Some(row)) => RetrievalConfig::from_row(&row).unwrap_or_else(|e| {
                warn!(agent = agent_id, error = %e, "Malformed retrieval config, using restricted default");
                RetrievalConfig::restricted(&self.defaults)
            }),
            Ok(None) => {
                debug!(agent = agent_id, "No retrieval config, using default");
                self.defaults.clone()
            }
            Err(e) => {
                warn!(agent = agent_id, error = %e, "Retrieval config unavailable, using restricted default");
                RetrievalConfig::restricted(&self.defaults)
            }
        }
    }

    pub fn save_retrieval_config(
        &self,
        agent_id: &str,
        data_source_id: Option<&str>,
        config: &RetrievalConfig,
    ) -> SiftResult<()> {
        if agent_id.trim().is_empty() {
            return Err(SiftError::invalid("agent id must not be empty"));
        }
        config.validate()?;
        queries::save_config(&self.pool, &config.to_row(agent_id, data_source_id))?;
        info!(agent = agent_id, data_source = ?data_source_id, "Retrieval config saved");

        if let Ok(mut context) = self.context.write() {
            if let Some(active) = context.as_mut() {
                if active.agent_id == agent_id {
                    active.config = self.lookup(agent_id, active.data_source_id.as_deref());
                }
            }
        }
        Ok(())
    }

    /// Stored configurations for an agent, keyed by data source (`None` for the agent default).
    pub fn list_retrieval_configs(&self, agent_id: &str) -> SiftResult<Vec<(Option<String>, RetrievalConfig)>> {
        queries::list_configs(&self.pool, agent_id)?
            .iter()
            .map(|row| {
                let ds = (!row.data_source_id.is_empty()).then(|| row.data_source_id.clone());
                RetrievalConfig::from_row(row).map(|c| (ds, c))
            })
            .collect()
    }

    fn backends_for(&self, kind: SearchBackendKind) -> (Vec<Arc<dyn SearchBackend>>, Vec<String>) {
        let wanted = match kind {
            SearchBackendKind::Internal => vec![("internal", &self.internal)],
            SearchBackendKind::External => vec![("external", &self.external)],
            SearchBackendKind::Both => vec![("internal", &self.internal), ("external", &self.external)],
        };

        let mut backends = Vec::new();
        let mut missing = Vec::new();
        for (label, slot) in wanted {
            match slot {
                Some(backend) => backends.push(Arc::clone(backend)),
                None => {
                    warn!(backend = label, "Configured search backend is not available");
                    missing.push(label.to_string());
                }
            }
        }
        (backends, missing)
    }

    /// Run a search. Backend failures degrade the response instead of failing it.
    pub async fn search(&self, request: &SearchRequest) -> SiftResult<SearchResponse> {
        if request.limit == 0 || request.limit > MAX_SEARCH_LIMIT {
            return Err(SiftError::invalid(format!(
                "limit must be between 1 and {}, got {}",
                MAX_SEARCH_LIMIT, request.limit
            )));
        }
        let text = request.query.trim();
        if text.is_empty() {
            return Ok(SearchResponse::default());
        }

        let started = Instant::now();
        let config = self.config_for(request.agent_id.as_deref(), request.data_source_id.as_deref());

        let mut mode = request.mode.unwrap_or(config.search_mode);
        if mode != SearchMode::Keyword && !config.enable_semantic_search {
            debug!(requested = %mode, "Semantic search disabled, using keyword");
            mode = SearchMode::Keyword;
        }
        let kinds: &[QueryKind] = match mode {
            SearchMode::Keyword => &[QueryKind::Keyword],
            SearchMode::Semantic => &[QueryKind::Semantic],
            SearchMode::Hybrid => &[QueryKind::Keyword, QueryKind::Semantic],
        };
        let limit = request.limit.min(config.max_results.max(1));

        let entities = match self.resolver.extract_entities(text) {
            Ok(found) => found.into_iter().map(|r| r.entity.name).collect(),
            Err(e) => {
                warn!(error = %e, "Entity extraction failed, searching without entity context");
                Vec::new()
            }
        };
        let filters = request.filters.clone().unwrap_or_default();
        let (backends, mut degraded) = self.backends_for(config.search_backend);

        let base = BackendQuery {
            text: text.to_string(),
            kind: QueryKind::Keyword,
            limit,
            entities,
            index_name: config.external_index_name.clone(),
            filters: filters.clone(),
        };

        let mut plans = Vec::with_capacity(backends.len() * kinds.len());
        for backend in &backends {
            for &kind in kinds {
                plans.push((Arc::clone(backend), BackendQuery { kind, ..base.clone() }));
            }
        }
        let timeout = self.backend_timeout;
        let outcomes = join_all(plans.into_iter().map(|(backend, query)| async move {
            let outcome = tokio::time::timeout(timeout, backend.search(&query)).await;
            (backend.name().to_string(), query.kind, outcome)
        }))
        .await;

        let mut sets = Vec::with_capacity(outcomes.len());
        for (name, kind, outcome) in outcomes {
            match outcome {
                Ok(Ok(mut hits)) => {
                    if kind == QueryKind::Semantic {
                        hits.retain(|h| h.score >= config.similarity_threshold);
                    }
                    debug!(backend = %name, kind = kind.as_str(), hits = hits.len(), "Backend answered");
                    sets.push(hits);
                }
                Ok(Err(e)) => {
                    warn!(backend = %name, kind = kind.as_str(), error = %e, "Search backend failed");
                    if !degraded.contains(&name) {
                        degraded.push(name);
                    }
                }
                Err(_) => {
                    warn!(
                        backend = %name,
                        kind = kind.as_str(),
                        timeout_ms = self.backend_timeout.as_millis() as u64,
                        "Search backend timed out"
                    );
                    if !degraded.contains(&name) {
                        degraded.push(name);
                    }
                }
            }
        }

        let mut results = merge_max(sets);
        if !filters.is_empty() {
            results.retain(|r| r.matches_filters(&filters));
        }
        results.truncate(limit);

        info!(
            mode = %mode,
            results = results.len(),
            degraded = degraded.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search completed"
        );
        Ok(SearchResponse {
            results,
            degraded_backends: degraded,
        })
    }

    /// Run a read-only SQL query, if the agent may.
    pub fn query_structured_data(&self, request: &StructuredQuery) -> SiftResult<StructuredResult> {
        let config = self.config_for(request.agent_id.as_deref(), request.data_source_id.as_deref());
        if !config.enable_sql_queries {
            return Err(SiftError::permission_denied("enable_sql_queries"));
        }

        let sql = validate_select(&request.query)?;
        let result = structured::run_select(&self.pool, sql, self.max_structured_rows).map_err(|e| match e {
            DbError::ReadOnlyViolation(_) => SiftError::invalid("only read-only SELECT statements are allowed"),
            DbError::Connection(e) => SiftError::invalid(format!("query failed: {}", e)),
            other => other.into(),
        })?;

        debug!(rows = result.rows.len(), truncated = result.truncated, "Structured query executed");
        Ok(StructuredResult {
            row_count: result.rows.len(),
            columns: result.columns,
            rows: result.rows,
            truncated: result.truncated,
        })
    }
}

/// A single `SELECT`/`WITH` statement, with one trailing semicolon allowed.
fn validate_select(sql: &str) -> SiftResult<&str> {
    let trimmed = sql.trim();
    let statement = trimmed.strip_suffix(';').unwrap_or(trimmed).trim_end();
    if statement.is_empty() {
        return Err(SiftError::invalid("query must not be empty"));
    }
    if statement.contains(';') {
        return Err(SiftError::invalid("only a single statement is allowed"));
    }
    let first = statement
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if first != "select" && first != "with" {
        return Err(SiftError::invalid("only SELECT statements are allowed"));
    }
    Ok(statement)
}
