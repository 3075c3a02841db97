//! Web server command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use sift_core::SiftEngine;

#[derive(Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, default_value = "3030")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Also write logs to this file
    #[arg(long)]
    pub log: Option<PathBuf>,
}

pub async fn execute(args: ServeArgs, engine: SiftEngine) -> Result<()> {
    println!();
    println!("  {} {}", "Sift".cyan().bold(), "API Server".bold());
    println!();
    println!("  {}       http://{}:{}/api", "API".green(), args.host, args.port);
    println!("  {}    http://{}:{}/health", "Health".green(), args.host, args.port);
    if let Some(log) = &args.log {
        println!("  {}      {}", "Logs".green(), log.display());
    }
    println!();
    println!("  {}", "Ctrl+C to stop".dimmed());
    println!();

    sift_web::run_server(Arc::new(engine), &args.host, args.port).await
}
