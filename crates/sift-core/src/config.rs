//! Runtime configuration.
//!
//! Loaded from `sift.toml`; every section has defaults so an empty or
//! missing file is valid. Connection endpoints can be overridden from the
//! environment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{SiftError, SiftResult};
use crate::retrieval::RetrievalConfig;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "sift.toml";

/// Top-level `sift.toml` settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SiftConfig {
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub retrieval: RetrievalSettings,
    pub graph: GraphSettings,
    pub embedding: EmbeddingSettings,
    pub external: ExternalSettings,
    pub neo4j: Neo4jSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".sift/sift.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub schema_ttl_secs: u64,
    pub entity_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            schema_ttl_secs: 600,
            entity_ttl_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Per-branch timeout for backend calls.
    pub backend_timeout_ms: u64,
    /// Row cap for structured queries.
    pub max_structured_rows: usize,
    /// Used when an agent has no stored configuration.
    pub default: RetrievalConfig,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            backend_timeout_ms: 5_000,
            max_structured_rows: 1_000,
            default: RetrievalConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    pub max_rows_per_entity: usize,
    /// Entity name -> weight, overriding the weight stored on the entity.
    pub entity_weights: HashMap<String, f64>,
    /// Relationship kind -> edge weight multiplier.
    pub relationship_weights: HashMap<String, f64>,
    /// Candidate columns for a node's display name, in priority order.
    pub label_fields: Vec<String>,
}

impl Default for GraphSettings {
    fn default() -> Self {
        Self {
            max_rows_per_entity: 10_000,
            entity_weights: HashMap::new(),
            relationship_weights: HashMap::new(),
            label_fields: ["name", "title", "display_name", "label", "full_name", "email", "code"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Attach the Qdrant node index for semantic search and build-time embedding.
    pub enabled: bool,
    pub ollama_url: String,
    pub model: String,
    pub qdrant_url: String,
    pub collection: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            ollama_url: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            qdrant_url: "http://localhost:6334".to_string(),
            collection: "sift_nodes".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalSettings {
    /// Base URL of the external search service. Unset disables the backend.
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub default_index: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Neo4jSettings {
    pub uri: String,
    pub user: String,
    pub password: String,
}

impl Default for Neo4jSettings {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "neo4j".to_string(),
        }
    }
}

impl SiftConfig {
    /// Load configuration.
    ///
    /// Resolution order: explicit path, `SIFT_CONFIG`, `./sift.toml`,
    /// defaults. Environment overrides are applied last.
    pub fn load(path: Option<&Path>) -> SiftResult<Self> {
        let candidate = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("SIFT_CONFIG").ok().map(PathBuf::from))
            .or_else(|| {
                let local = PathBuf::from(CONFIG_FILE);
                local.exists().then_some(local)
            });

        let mut config = match candidate {
            Some(p) => Self::from_file(&p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> SiftResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SiftError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> SiftResult<Self> {
        toml::from_str(text).map_err(|e| SiftError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> SiftResult<String> {
        toml::to_string_pretty(self).map_err(|e| SiftError::Config(e.to_string()))
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("SIFT_DB") {
            self.database.path = PathBuf::from(v);
        }
        if let Some(v) = lookup("OLLAMA_URL") {
            self.embedding.ollama_url = v;
        }
        if let Some(v) = lookup("QDRANT_URL") {
            self.embedding.qdrant_url = v;
        }
        if let Some(v) = lookup("SIFT_SEARCH_URL") {
            self.external.url = Some(v);
        }
        if let Some(v) = lookup("SIFT_SEARCH_API_KEY") {
            self.external.api_key = Some(v);
        }
        if let Some(v) = lookup("NEO4J_URI") {
            self.neo4j.uri = v;
        }
        if let Some(v) = lookup("NEO4J_USER") {
            self.neo4j.user = v;
        }
        if let Some(v) = lookup("NEO4J_PASSWORD") {
            self.neo4j.password = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{SearchBackendKind, SearchMode};
    use std::io::Write;

    #[test]
    fn test_empty_file_is_defaults() {
        let config = SiftConfig::from_toml_str("").unwrap();
        assert_eq!(config.cache.schema_ttl_secs, 600);
        assert_eq!(config.cache.entity_ttl_secs, 300);
        assert_eq!(config.retrieval.default.search_mode, SearchMode::Hybrid);
    }

    #[test]
    fn test_partial_sections() {
        let text = r#"
            [graph]
            max_rows_per_entity = 50
            relationship_weights = { HAS_MANY = 2.5 }

            [retrieval.default]
            search_backend = "both"
            enable_sql_queries = true
        "#;
        let config = SiftConfig::from_toml_str(text).unwrap();
        assert_eq!(config.graph.max_rows_per_entity, 50);
        assert_eq!(config.graph.relationship_weights["HAS_MANY"], 2.5);
        assert!(!config.graph.label_fields.is_empty());
        assert_eq!(config.retrieval.default.search_backend, SearchBackendKind::Both);
        assert!(config.retrieval.default.enable_sql_queries);
        assert_eq!(config.retrieval.backend_timeout_ms, 5_000);
    }

    #[test]
    fn test_load_from_file_and_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npath = \"/tmp/a.db\"").unwrap();

        let mut config = SiftConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/tmp/a.db"));

        config.apply_env(|key| match key {
            "SIFT_DB" => Some("/tmp/b.db".to_string()),
            "SIFT_SEARCH_URL" => Some("http://search:9200".to_string()),
            _ => None,
        });
        assert_eq!(config.database.path, PathBuf::from("/tmp/b.db"));
        assert_eq!(config.external.url.as_deref(), Some("http://search:9200"));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(SiftConfig::from_toml_str("[cache"), Err(SiftError::Config(_))));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let text = SiftConfig::default().to_toml_string().unwrap();
        let parsed = SiftConfig::from_toml_str(&text).unwrap();
        assert_eq!(parsed.embedding.collection, "sift_nodes");
    }
}
