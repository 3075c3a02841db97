//! Entity and alias commands.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use sift_core::entity::{FieldType, SemanticEntity, SemanticField};
use sift_core::SiftEngine;

use crate::output;

#[derive(Subcommand)]
pub enum EntityCommands {
    /// List registered entities
    List,

    /// Show one entity
    Show {
        name: String,
    },

    /// Register an entity over a table, deriving fields from its columns
    Add {
        /// Entity name
        name: String,
        /// Source table
        #[arg(long)]
        table: String,
        /// Display name (defaults to the entity name)
        #[arg(long)]
        display: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// Importance weight
        #[arg(long, default_value = "1.0")]
        weight: f64,
        /// Aliases, comma separated
        #[arg(long, value_delimiter = ',')]
        aliases: Vec<String>,
    },

    /// Register or update entities from a JSON array
    Import {
        file: PathBuf,
    },

    /// Remove an entity and its aliases
    Remove {
        name: String,
    },

    /// Add an alias to an entity
    Alias {
        name: String,
        alias: String,
    },

    /// Remove an alias from an entity
    Unalias {
        name: String,
        alias: String,
    },

    /// Entities connected to an entity
    Related {
        name: String,
    },

    /// Resolve the entities mentioned in a piece of text
    Extract {
        text: String,
    },
}

pub fn execute(cmd: EntityCommands, engine: &SiftEngine) -> Result<()> {
    let resolver = engine.resolver();
    match cmd {
        EntityCommands::List => output::print_entities_table(&resolver.get_all_entities()?),
        EntityCommands::Show { name } => match resolver.get_entity(&name)? {
            Some(entity) => output::print_entity(&entity),
            None => println!("{} Entity not found: {}", "✗".red(), name),
        },
        EntityCommands::Add {
            name,
            table,
            display,
            description,
            weight,
            aliases,
        } => {
            let def = engine
                .catalog()
                .get_table(&table)?
                .ok_or_else(|| anyhow::anyhow!("Table not found: {}", table))?;

            let mut entity = SemanticEntity::new(&name, display.as_deref().unwrap_or(&name), &def.name);
            entity.description = description;
            entity.weight = weight;
            entity.aliases = aliases;
            entity.fields = def
                .columns
                .iter()
                .map(|c| {
                    let field_type = if c.is_primary_key || c.foreign_key.is_some() {
                        FieldType::Identifier
                    } else {
                        FieldType::from_sql_type(&c.data_type)
                    };
                    SemanticField {
                        name: c.name.clone(),
                        field_type,
                        description: None,
                        searchable: field_type == FieldType::Text,
                        filterable: c.foreign_key.is_some(),
                    }
                })
                .collect();

            resolver.register_entity(&entity)?;
            println!(
                "{} Registered {} over {} ({} fields)",
                "✓".green().bold(),
                name.cyan(),
                def.name,
                entity.fields.len()
            );
        }
        EntityCommands::Import { file } => {
            let text = std::fs::read_to_string(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let entities: Vec<SemanticEntity> =
                serde_json::from_str(&text).with_context(|| format!("Invalid entity file {}", file.display()))?;
            for entity in &entities {
                resolver
                    .register_entity(entity)
                    .with_context(|| format!("Failed to register entity '{}'", entity.name))?;
                println!("{} {}", "✓".green(), entity.name.cyan());
            }
            println!("\n{} entities imported.", entities.len().to_string().bold());
        }
        EntityCommands::Remove { name } => {
            resolver.remove_entity(&name)?;
            println!("{} Removed {}", "✓".green().bold(), name.cyan());
        }
        EntityCommands::Alias { name, alias } => {
            resolver.add_alias(&alias, &name)?;
            println!("{} {} → {}", "✓".green().bold(), alias.yellow(), name.cyan());
        }
        EntityCommands::Unalias { name, alias } => {
            resolver.remove_alias(&alias, &name)?;
            println!("{} Removed alias {} from {}", "✓".green().bold(), alias.yellow(), name.cyan());
        }
        EntityCommands::Related { name } => {
            let related = resolver.get_related(&name)?;
            if related.is_empty() {
                println!("{}", "No related entities.".dimmed());
            }
            for entity in related {
                println!("  {} {} ({})", "→".dimmed(), entity.name.cyan(), entity.source_table.dimmed());
            }
        }
        EntityCommands::Extract { text } => output::print_resolved(&engine.extract_entities(&text)),
    }
    Ok(())
}
