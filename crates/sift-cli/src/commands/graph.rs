//! Knowledge graph CLI commands.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use sift_core::graph::BuildOptions;
use sift_core::SiftEngine;
use sift_graph::GraphClient;

use crate::output;

#[derive(Subcommand)]
pub enum GraphCommands {
    /// Rebuild the knowledge graph from the registered entities
    Build {
        /// Also embed every node into the vector index
        #[arg(long)]
        embeddings: bool,
    },

    /// Show node and edge counts of the persisted graph
    Stats,

    /// Show one node and its neighbors
    Show {
        /// Node id, e.g. customer:42
        id: String,
    },

    /// Replace the Neo4j mirror with the persisted graph
    Export,

    /// Show what is currently exported to Neo4j
    Status,
}

pub async fn execute(cmd: GraphCommands, engine: &SiftEngine) -> Result<()> {
    match cmd {
        GraphCommands::Build { embeddings } => cmd_build(engine, embeddings).await,
        GraphCommands::Stats => {
            output::print_stats(&engine.graph_stats()?);
            if let Some(build) = engine.graph().latest_build()? {
                println!("  Last build:    {}", build.finished_at.green());
            }
            Ok(())
        }
        GraphCommands::Show { id } => cmd_show(engine, &id),
        GraphCommands::Export => cmd_export(engine).await,
        GraphCommands::Status => cmd_status(engine).await,
    }
}

async fn cmd_build(engine: &SiftEngine, embeddings: bool) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.cyan} {msg} {elapsed:.dim}")?);
    spinner.set_message("Building knowledge graph...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let result = engine
        .build_graph(BuildOptions {
            generate_embeddings: embeddings,
        })
        .await;
    spinner.finish_and_clear();

    let report = result?;
    output::print_build_report(&report);
    Ok(())
}

fn cmd_show(engine: &SiftEngine, id: &str) -> Result<()> {
    let Some(node) = engine.graph().get_node(id)? else {
        println!("{} Node not found: {}", "✗".red(), id);
        return Ok(());
    };

    println!("{} {}", node.name.cyan().bold(), format!("({})", node.id).dimmed());
    println!("{}: {}", "Type".bold(), node.node_type);
    println!("{}: {:.3}", "Importance".bold(), node.importance_score);
    if !node.properties.is_empty() {
        println!();
        println!("{}", "Properties".bold());
        for (key, value) in &node.properties {
            println!("  {:<20} {}", key, serde_json::to_string(value)?.dimmed());
        }
    }

    let neighbors = engine.graph().neighbors(id)?;
    if !neighbors.is_empty() {
        println!();
        println!("{} ({}):", "Neighbors".bold(), neighbors.len());
        for (edge, other) in neighbors {
            let arrow = if edge.source_id == node.id { "→" } else { "←" };
            println!(
                "  {} {} {} {}",
                arrow.dimmed(),
                edge.relationship_type.yellow(),
                other.name,
                format!("({})", other.id).dimmed()
            );
        }
    }
    Ok(())
}

async fn cmd_export(engine: &SiftEngine) -> Result<()> {
    println!("{}", "Exporting to Neo4j...".bold());
    let client = GraphClient::connect(&engine.config().neo4j).await?;
    sift_graph::schema::initialize_schema(&client).await?;

    let snapshot = engine.graph().snapshot(i64::MAX as usize)?;
    let result = sift_graph::export_graph(&client, &snapshot).await?;

    println!("\n{}", "Export complete:".green().bold());
    println!("  Nodes:         {}", result.nodes);
    println!("  Relationships: {}", result.relationships);
    println!("  Replaced:      {}", result.removed);
    Ok(())
}

async fn cmd_status(engine: &SiftEngine) -> Result<()> {
    println!("{}", "Neo4j Mirror Status".bold());
    println!("{}", "─".repeat(40));

    let client = GraphClient::connect(&engine.config().neo4j).await?;
    let counts = client.get_counts().await?;
    println!("  Nodes:         {}", counts.nodes.to_string().cyan());
    println!("  Relationships: {}", counts.relationships.to_string().cyan());

    let local = engine.graph_stats()?;
    if local.total_nodes != counts.nodes || local.total_edges != counts.relationships {
        println!("  {}", "Out of date, run 'sift graph export'.".yellow());
    }
    println!("{}", "─".repeat(40));
    Ok(())
}
