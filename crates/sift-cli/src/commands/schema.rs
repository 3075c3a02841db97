//! Schema catalog commands.

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use sift_core::SiftEngine;

use crate::output;

#[derive(Subcommand)]
pub enum SchemaCommands {
    /// List tables with row counts
    Tables,

    /// Show the columns and keys of a table
    Show {
        /// Table name
        table: String,
    },

    /// Shortest join path between two tables
    Path {
        from: String,
        to: String,
    },

    /// Tables containing a column
    Column {
        /// Column name
        name: String,
    },
}

pub fn execute(cmd: SchemaCommands, engine: &SiftEngine) -> Result<()> {
    let catalog = engine.catalog();
    match cmd {
        SchemaCommands::Tables => {
            let schema = catalog.get_schema()?;
            let rows: Vec<(String, i64, usize)> = schema
                .tables
                .iter()
                .map(|t| (t.name.clone(), catalog.get_row_count(&t.name), t.columns.len()))
                .collect();
            output::print_tables(&rows);
            println!("\n{} relationship(s)", schema.relationships.len());
        }
        SchemaCommands::Show { table } => match catalog.get_table(&table)? {
            Some(def) => output::print_table_definition(&def, catalog.get_row_count(&def.name)),
            None => println!("{} Table not found: {}", "✗".red(), table),
        },
        SchemaCommands::Path { from, to } => match catalog.get_join_path(&from, &to)? {
            Some(path) if path.is_empty() => println!("{} and {} are the same table", from.cyan(), to.cyan()),
            Some(path) => output::print_join_path(&path),
            None => println!("{}", format!("No join path from {} to {}.", from, to).dimmed()),
        },
        SchemaCommands::Column { name } => {
            let tables = catalog.find_tables_with_column(&name)?;
            if tables.is_empty() {
                println!("{}", "No tables found.".dimmed());
            }
            for table in tables {
                println!("  {}", table.cyan());
            }
        }
    }
    Ok(())
}
