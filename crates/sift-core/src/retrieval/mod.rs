//! Unified retrieval over the internal store and an optional external index.

pub mod backend;
pub mod internal;
pub mod merge;
pub mod model;
pub mod retriever;

pub use backend::{BackendQuery, QueryKind, SearchBackend, VectorHit, VectorIndex};
pub use internal::{InternalBackend, INTERNAL_BACKEND};
pub use merge::merge_max;
pub use model::{
    RetrievalConfig, SearchBackendKind, SearchMode, SearchRequest, SearchResponse, SearchResult, StructuredQuery,
    StructuredResult, MAX_SEARCH_LIMIT,
};
pub use retriever::{AgentContext, UnifiedRetriever};
