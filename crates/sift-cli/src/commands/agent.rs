//! Per-agent retrieval configuration commands.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use sift_core::retrieval::{SearchBackendKind, SearchMode};
use sift_core::SiftEngine;

use crate::output;

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Show the effective retrieval configuration
    Show {
        agent: String,
        #[arg(long)]
        data_source: Option<String>,
    },

    /// Update an agent's retrieval configuration
    Set {
        agent: String,
        #[arg(long)]
        data_source: Option<String>,
        /// Allow read-only SQL queries
        #[arg(long)]
        sql: Option<bool>,
        /// Allow semantic search
        #[arg(long)]
        semantic: Option<bool>,
        /// postgres, external or both
        #[arg(long)]
        backend: Option<SearchBackendKind>,
        /// semantic, keyword or hybrid
        #[arg(long)]
        mode: Option<SearchMode>,
        /// External index name
        #[arg(long)]
        index: Option<String>,
        #[arg(long)]
        max_results: Option<usize>,
        #[arg(long)]
        threshold: Option<f64>,
    },

    /// List stored configurations for an agent
    List {
        agent: String,
    },
}

pub fn execute(cmd: AgentCommands, engine: &SiftEngine) -> Result<()> {
    let retriever = engine.retriever();
    match cmd {
        AgentCommands::Show { agent, data_source } => {
            let config = retriever.config_for(Some(&agent), data_source.as_deref());
            output::print_config(&agent, data_source.as_deref(), &config);
        }
        AgentCommands::Set {
            agent,
            data_source,
            sql,
            semantic,
            backend,
            mode,
            index,
            max_results,
            threshold,
        } => {
            let mut config = retriever.config_for(Some(&agent), data_source.as_deref());
            if let Some(v) = sql {
                config.enable_sql_queries = v;
            }
            if let Some(v) = semantic {
                config.enable_semantic_search = v;
            }
            if let Some(v) = backend {
                config.search_backend = v;
            }
            if let Some(v) = mode {
                config.search_mode = v;
            }
            if let Some(v) = index {
                config.external_index_name = (!v.is_empty()).then_some(v);
            }
            if let Some(v) = max_results {
                config.max_results = v;
            }
            if let Some(v) = threshold {
                config.similarity_threshold = v;
            }

            retriever.save_retrieval_config(&agent, data_source.as_deref(), &config)?;
            println!("{} Saved retrieval config for {}", "✓".green().bold(), agent.cyan());
            output::print_config(&agent, data_source.as_deref(), &config);
        }
        AgentCommands::List { agent } => {
            let configs = retriever.list_retrieval_configs(&agent)?;
            if configs.is_empty() {
                println!("{}", "No stored configurations, defaults apply.".dimmed());
            }
            for (data_source, config) in configs {
                output::print_config(&agent, data_source.as_deref(), &config);
                println!();
            }
        }
    }
    Ok(())
}
