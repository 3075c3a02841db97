//! Search backend seams.
//!
//! The retriever only sees [`SearchBackend`]s. A backend answers one
//! sub-query at a time in either keyword or semantic mode; hybrid requests
//! are split by the retriever and merged afterwards.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::SiftResult;
use super::model::SearchResult;

/// Mode of a single backend sub-query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    Keyword,
    Semantic,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Semantic => "semantic",
        }
    }
}

/// A sub-query as handed to one backend.
#[derive(Debug, Clone)]
pub struct BackendQuery {
    pub text: String,
    pub kind: QueryKind,
    pub limit: usize,
    /// Entities resolved from the query text, best first.
    pub entities: Vec<String>,
    pub index_name: Option<String>,
    pub filters: HashMap<String, serde_json::Value>,
}

/// Something that answers keyword or semantic sub-queries.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Stable name, used as `SearchResult::source` and in degraded reports.
    fn name(&self) -> &str;

    async fn search(&self, query: &BackendQuery) -> SiftResult<Vec<SearchResult>>;
}

/// A scored hit from a vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub score: f64,
    pub content: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Embedding similarity index over graph nodes.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest neighbours of `text`, best first, scores in [0, 1].
    async fn similar(&self, text: &str, limit: usize) -> SiftResult<Vec<VectorHit>>;
}
