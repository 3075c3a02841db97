//! Structured (SQL) query command.

use anyhow::Result;
use clap::Args;

use sift_core::retrieval::StructuredQuery;
use sift_core::SiftEngine;

use crate::output;

#[derive(Args)]
pub struct QueryArgs {
    /// A single SELECT statement
    pub sql: String,

    #[arg(long)]
    pub agent: Option<String>,

    #[arg(long)]
    pub data_source: Option<String>,

    /// Print raw JSON
    #[arg(long)]
    pub json: bool,
}

pub fn execute(args: QueryArgs, engine: &SiftEngine) -> Result<()> {
    let request = StructuredQuery {
        query: args.sql,
        agent_id: args.agent,
        data_source_id: args.data_source,
    };
    let result = engine.query_structured_data(&request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        output::print_structured(&result);
    }
    Ok(())
}
