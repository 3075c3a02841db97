//! Unified search command.

use anyhow::Result;
use clap::Args;

use sift_core::retrieval::{SearchMode, SearchRequest};
use sift_core::SiftEngine;

use crate::output;

#[derive(Args)]
pub struct SearchArgs {
    /// Free-text query
    pub query: String,

    #[arg(long)]
    pub agent: Option<String>,

    #[arg(long)]
    pub data_source: Option<String>,

    /// semantic, keyword or hybrid (defaults to the agent's mode)
    #[arg(long)]
    pub mode: Option<SearchMode>,

    #[arg(short, long, default_value = "10")]
    pub limit: usize,

    /// Print raw JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn execute(args: SearchArgs, engine: &SiftEngine) -> Result<()> {
    let mut request = SearchRequest::new(args.query).with_limit(args.limit);
    request.mode = args.mode;
    if let Some(agent) = &args.agent {
        request = request.for_agent(agent, args.data_source.as_deref());
    }

    if args.agent.is_none() {
        tracing::debug!("No agent given, using the default retrieval config");
    }
    let response = engine.search(&request).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else {
        output::print_resolved(&engine.extract_entities(&request.query));
        output::print_search_response(&response);
    }
    Ok(())
}
