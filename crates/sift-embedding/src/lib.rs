//! # Sift Embedding
//!
//! Network-backed collaborators for the retrieval core: Ollama embeddings,
//! the Qdrant node index and the external search service backend.

pub mod external;
pub mod index;
pub mod ollama;
pub mod qdrant;

pub use external::{HttpSearchBackend, EXTERNAL_BACKEND};
pub use index::QdrantNodeIndex;
pub use ollama::OllamaClient;
pub use qdrant::QdrantStore;
