//! CLI command definitions and handlers.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use sift_core::{Adapters, SiftConfig, SiftEngine};
use sift_embedding::{HttpSearchBackend, OllamaClient, QdrantNodeIndex, QdrantStore};

pub mod agent;
pub mod entity;
pub mod graph;
pub mod init;
pub mod query;
pub mod schema;
pub mod search;
pub mod serve;

/// Sift - semantic retrieval over relational data
#[derive(Parser)]
#[command(name = "sift")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to sift.toml
    #[arg(short, long, global = true, env = "SIFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the config file and database
    Init(init::InitArgs),

    /// Inspect the relational schema
    #[command(subcommand)]
    Schema(schema::SchemaCommands),

    /// Manage semantic entities and aliases
    #[command(subcommand)]
    Entity(entity::EntityCommands),

    /// Manage per-agent retrieval configuration
    #[command(subcommand)]
    Agent(agent::AgentCommands),

    /// Build and inspect the knowledge graph
    #[command(subcommand)]
    Graph(graph::GraphCommands),

    /// Search across the configured backends
    Search(search::SearchArgs),

    /// Run a read-only SQL query
    Query(query::QueryArgs),

    /// Start the JSON API server
    Serve(serve::ServeArgs),
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        let mut config = SiftConfig::load(self.config.as_deref())?;
        if let Some(db) = self.db {
            config.database.path = db;
        }

        match self.command {
            Commands::Init(args) => init::execute(args, &config, self.config.as_deref()),
            Commands::Schema(cmd) => schema::execute(cmd, &open_engine(config)?),
            Commands::Entity(cmd) => entity::execute(cmd, &open_engine(config)?),
            Commands::Agent(cmd) => agent::execute(cmd, &open_engine(config)?),
            Commands::Graph(cmd) => graph::execute(cmd, &open_engine(config)?).await,
            Commands::Search(args) => search::execute(args, &open_engine(config)?).await,
            Commands::Query(args) => query::execute(args, &open_engine(config)?),
            Commands::Serve(args) => serve::execute(args, open_engine(config)?).await,
        }
    }
}

/// Open the database and wire the engine with whatever adapters are configured.
pub fn open_engine(config: SiftConfig) -> Result<SiftEngine> {
    let path = &config.database.path;
    if !path.exists() {
        anyhow::bail!("No database at {}. Run 'sift init' first.", path.display());
    }
    let pool = sift_db::init_pool(path).with_context(|| format!("Failed to open {}", path.display()))?;

    let mut adapters = Adapters::default();
    if config.embedding.enabled {
        let ollama = OllamaClient::new(&config.embedding.ollama_url, &config.embedding.model);
        let qdrant = QdrantStore::new(&config.embedding.qdrant_url)?;
        let index = Arc::new(QdrantNodeIndex::new(ollama, qdrant, &config.embedding.collection));
        adapters.vectors = Some(index.clone());
        adapters.indexer = Some(index);
    }
    if let Some(url) = &config.external.url {
        adapters.external = Some(Arc::new(HttpSearchBackend::new(
            url,
            config.external.api_key.clone(),
            config.external.default_index.clone(),
        )));
    }

    Ok(SiftEngine::new(pool, config, adapters))
}
