//! Retrieval requests, results and per-agent configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

use sift_db::queries::retrieval::RetrievalConfigRow;

use crate::error::{SiftError, SiftResult};

/// Upper bound on `SearchRequest::limit`.
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Which search backends an agent may use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchBackendKind {
    /// The relational store plus its attached vector index.
    #[default]
    #[serde(rename = "postgres", alias = "internal")]
    Internal,
    #[serde(rename = "external")]
    External,
    #[serde(rename = "both")]
    Both,
}

impl SearchBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "postgres",
            Self::External => "external",
            Self::Both => "both",
        }
    }
}

impl FromStr for SearchBackendKind {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "internal" => Ok(Self::Internal),
            "external" => Ok(Self::External),
            "both" => Ok(Self::Both),
            other => Err(SiftError::invalid(format!("unknown search backend '{}'", other))),
        }
    }
}

/// How a query is matched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Semantic,
    #[default]
    Hybrid,
    Keyword,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Semantic => "semantic",
            Self::Hybrid => "hybrid",
            Self::Keyword => "keyword",
        }
    }
}

impl FromStr for SearchMode {
    type Err = SiftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "semantic" => Ok(Self::Semantic),
            "hybrid" => Ok(Self::Hybrid),
            "keyword" => Ok(Self::Keyword),
            other => Err(SiftError::invalid(format!("unknown search mode '{}'", other))),
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieval settings for one agent and data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub enable_sql_queries: bool,
    pub enable_semantic_search: bool,
    pub search_backend: SearchBackendKind,
    pub search_mode: SearchMode,
    pub external_index_name: Option<String>,
    pub max_results: usize,
    pub similarity_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enable_sql_queries: false,
            enable_semantic_search: true,
            search_backend: SearchBackendKind::Internal,
            search_mode: SearchMode::Hybrid,
            external_index_name: None,
            max_results: 10,
            similarity_threshold: 0.5,
        }
    }
}

impl RetrievalConfig {
    pub fn from_row(row: &RetrievalConfigRow) -> SiftResult<Self> {
        Ok(Self {
            enable_sql_queries: row.enable_sql_queries,
            enable_semantic_search: row.enable_semantic_search,
            search_backend: row.search_backend.parse()?,
            search_mode: row.search_mode.parse()?,
            external_index_name: row.external_index_name.clone(),
            max_results: row.max_results.max(0) as usize,
            similarity_threshold: row.similarity_threshold,
        })
    }

    pub fn to_row(&self, agent_id: &str, data_source_id: Option<&str>) -> RetrievalConfigRow {
        RetrievalConfigRow {
            agent_id: agent_id.to_string(),
            data_source_id: data_source_id.unwrap_or_default().to_string(),
            enable_sql_queries: self.enable_sql_queries,
            enable_semantic_search: self.enable_semantic_search,
            search_backend: self.search_backend.as_str().to_string(),
            search_mode: self.search_mode.as_str().to_string(),
            external_index_name: self.external_index_name.clone(),
            max_results: self.max_results as i64,
            similarity_threshold: self.similarity_threshold,
        }
    }

    /// Fallback used when an agent's configuration cannot be read:
    /// structured queries are switched off, everything else follows `base`.
    pub fn restricted(base: &RetrievalConfig) -> Self {
        Self {
            enable_sql_queries: false,
            ..base.clone()
        }
    }

    pub fn validate(&self) -> SiftResult<()> {
        if self.max_results == 0 || self.max_results > MAX_SEARCH_LIMIT {
            return Err(SiftError::invalid(format!(
                "max_results must be between 1 and {}",
                MAX_SEARCH_LIMIT
            )));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SiftError::invalid("similarity_threshold must be within [0, 1]"));
        }
        Ok(())
    }
}

/// A logical search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub data_source_id: Option<String>,
    /// Falls back to the agent's configured mode.
    #[serde(default)]
    pub mode: Option<SearchMode>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Exact-match constraints on result metadata.
    #[serde(default)]
    pub filters: Option<HashMap<String, serde_json::Value>>,
}

fn default_limit() -> usize {
    10
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: default_limit(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn for_agent(mut self, agent_id: &str, data_source_id: Option<&str>) -> Self {
        self.agent_id = Some(agent_id.to_string());
        self.data_source_id = data_source_id.map(String::from);
        self
    }
}

/// One scored match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    /// Relevance in [0, 1].
    pub score: f64,
    /// Backend that produced the match.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl SearchResult {
    /// True when every filter key is present in the metadata with an equal value.
    pub fn matches_filters(&self, filters: &HashMap<String, serde_json::Value>) -> bool {
        if filters.is_empty() {
            return true;
        }
        let Some(metadata) = &self.metadata else {
            return false;
        };
        filters.iter().all(|(key, expected)| metadata.get(key) == Some(expected))
    }
}

/// Search results plus the backends that failed or timed out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_backends: Vec<String>,
}

impl SearchResponse {
    pub fn is_degraded(&self) -> bool {
        !self.degraded_backends.is_empty()
    }
}

/// A read-only SQL request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredQuery {
    pub query: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub data_source_id: Option<String>,
}

/// Rows returned by a structured query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructuredResult {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    pub row_count: usize,
    /// Set when the row cap cut the result short.
    pub truncated: bool,
}
