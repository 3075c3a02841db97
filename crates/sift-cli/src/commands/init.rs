//! Project initialization command.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

use sift_core::config::CONFIG_FILE;
use sift_core::SiftConfig;

#[derive(Args)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

pub fn execute(args: InitArgs, config: &SiftConfig, config_path: Option<&Path>) -> Result<()> {
    let config_path = config_path.map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(CONFIG_FILE));

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists, keeping it",
            "·".dimmed(),
            config_path.display().to_string().cyan()
        );
    } else {
        std::fs::write(&config_path, config.to_toml_string()?)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("{} Wrote {}", "✓".green().bold(), config_path.display().to_string().cyan());
    }

    let db_path = &config.database.path;
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    sift_db::init_pool(db_path).with_context(|| format!("Failed to initialize {}", db_path.display()))?;
    println!("{} Database ready: {}", "✓".green().bold(), db_path.display().to_string().cyan());

    println!();
    println!("{}", "Next steps:".bold());
    println!("  sift schema tables                  # Inspect the tables Sift can see");
    println!("  sift entity import entities.json    # Register semantic entities");
    println!("  sift graph build                    # Materialize the knowledge graph");
    println!("  sift search \"top customers\"         # Search");

    Ok(())
}
