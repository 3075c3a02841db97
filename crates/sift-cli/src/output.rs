//! Terminal output formatting.

use colored::{ColoredString, Colorize};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use sift_core::entity::{MatchType, ResolvedEntity, SemanticEntity};
use sift_core::graph::{BuildReport, BuildStats, EntityOutcome};
use sift_core::retrieval::{RetrievalConfig, SearchResponse, StructuredResult};
use sift_core::schema::{TableDefinition, TableRelationship};

const CONTENT_WIDTH: usize = 60;
const CELL_WIDTH: usize = 24;

/// Print tables as `(name, rows, columns)`.
pub fn print_tables(tables: &[(String, i64, usize)]) {
    if tables.is_empty() {
        println!("{}", "No tables found.".dimmed());
        return;
    }

    println!("{} {:>10} {:>8}", pad_right("Table", 32), "Rows", "Columns");
    println!("{}", "─".repeat(52));
    for (name, rows, columns) in tables {
        let rows = if *rows < 0 { "?".to_string() } else { rows.to_string() };
        println!("{} {:>10} {:>8}", pad_right(&truncate_visual(name, 32), 32).cyan(), rows, columns);
    }
}

/// Print one table's columns and keys.
pub fn print_table_definition(table: &TableDefinition, row_count: i64) {
    println!("{} {}", table.name.cyan().bold(), format!("({} rows)", row_count.max(0)).dimmed());
    println!();

    for column in &table.columns {
        let mut flags = Vec::new();
        if column.is_primary_key {
            flags.push("PK".yellow().to_string());
        }
        if let Some(fk) = &column.foreign_key {
            flags.push(format!("→ {}.{}", fk.table, fk.column).blue().to_string());
        }
        if !column.nullable {
            flags.push("NOT NULL".dimmed().to_string());
        }
        println!(
            "  {} {} {}",
            pad_right(&truncate_visual(&column.name, 28), 28),
            pad_right(&column.data_type.to_lowercase(), 12).dimmed(),
            flags.join(" ")
        );
    }
}

/// Print a join path hop by hop.
pub fn print_join_path(path: &[TableRelationship]) {
    for (i, hop) in path.iter().enumerate() {
        println!(
            "  {}. {}.{} {} {}.{} {}",
            i + 1,
            hop.from_table.cyan(),
            hop.from_column,
            "→".dimmed(),
            hop.to_table.cyan(),
            hop.to_column,
            format!("[{}]", hop.cardinality.as_str()).dimmed()
        );
    }
    println!("\n{} hop(s)", path.len());
}

pub fn print_entities_table(entities: &[SemanticEntity]) {
    if entities.is_empty() {
        println!("{}", "No entities registered.".dimmed());
        return;
    }

    println!("{} {} {:>7} {:>7}  {}", pad_right("Name", 20), pad_right("Table", 20), "Weight", "Fields", "Aliases");
    println!("{}", "─".repeat(80));
    for entity in entities {
        println!(
            "{} {} {:>7.2} {:>7}  {}",
            pad_right(&truncate_visual(&entity.name, 20), 20).cyan(),
            pad_right(&truncate_visual(&entity.source_table, 20), 20),
            entity.weight,
            entity.fields.len(),
            truncate_visual(&entity.aliases.join(", "), 24).dimmed()
        );
    }

    println!();
    println!("{} entit{} total", entities.len(), if entities.len() == 1 { "y" } else { "ies" });
}

/// Print a single entity.
pub fn print_entity(entity: &SemanticEntity) {
    println!("{} {}", entity.display_name.cyan().bold(), format!("({})", entity.name).dimmed());
    println!();

    if let Some(desc) = &entity.description {
        println!("{}", desc);
        println!();
    }

    println!("{}: {}", "Table".bold(), entity.source_table);
    println!("{}: {:.2}", "Weight".bold(), entity.weight);
    if let Some(owner) = &entity.domain_owner {
        println!("{}: {}", "Owner".bold(), owner);
    }
    if !entity.aliases.is_empty() {
        println!("{}: {}", "Aliases".bold(), entity.aliases.join(", ").yellow());
    }

    if !entity.fields.is_empty() {
        println!();
        println!("{}", "Fields".bold());
        for field in &entity.fields {
            let mut flags = Vec::new();
            if field.searchable {
                flags.push("searchable");
            }
            if field.filterable {
                flags.push("filterable");
            }
            println!(
                "  {} {} {}",
                pad_right(&field.name, 24),
                pad_right(field.field_type.as_str(), 12).dimmed(),
                flags.join(", ")
            );
        }
    }

    if !entity.relationships.is_empty() {
        println!();
        println!("{}", "Relationships".bold());
        for rel in &entity.relationships {
            let weight = rel.weight.map(|w| format!(" ({:.2})", w)).unwrap_or_default();
            println!("  {} {} {}{}", "→".dimmed(), rel.kind.yellow(), rel.target.cyan(), weight.dimmed());
        }
    }
}

/// Print entities found in a piece of text.
pub fn print_resolved(resolved: &[ResolvedEntity]) {
    if resolved.is_empty() {
        println!("{}", "No entities recognized.".dimmed());
        return;
    }

    println!("{}", "Entities".bold());
    for r in resolved {
        println!(
            "  {} {} via \"{}\" {}",
            match_label(r.match_type),
            r.entity.name.cyan(),
            r.matched_alias,
            format!("{:.0}%", r.confidence * 100.0).dimmed()
        );
    }
    println!();
}

fn match_label(match_type: MatchType) -> ColoredString {
    match match_type {
        MatchType::Exact => "exact".green(),
        MatchType::Alias => "alias".blue(),
        MatchType::Fuzzy => "fuzzy".yellow(),
    }
}

pub fn print_search_response(response: &SearchResponse) {
    if response.is_degraded() {
        println!(
            "{} unavailable: {}",
            "⚠".yellow().bold(),
            response.degraded_backends.join(", ").yellow()
        );
        println!();
    }

    if response.results.is_empty() {
        println!("{}", "No results.".dimmed());
        return;
    }

    for (i, result) in response.results.iter().enumerate() {
        println!(
            "{} {} {} {}",
            format!("{:>2}.", i + 1).dimmed(),
            format!("{:.3}", result.score).green(),
            result.id.cyan(),
            format!("[{}]", result.source).dimmed()
        );
        let content = result.content.replace('\n', " ");
        println!("    {}", truncate_visual(&content, CONTENT_WIDTH));
    }

    println!();
    println!("{} result(s)", response.results.len());
}

/// Print SQL rows as a column table.
pub fn print_structured(result: &StructuredResult) {
    if result.columns.is_empty() {
        println!("{}", "No columns.".dimmed());
        return;
    }

    let header: Vec<String> = result
        .columns
        .iter()
        .map(|c| pad_right(&truncate_visual(c, CELL_WIDTH), CELL_WIDTH))
        .collect();
    println!("{}", header.join(" ").bold());
    println!("{}", "─".repeat((CELL_WIDTH + 1) * result.columns.len()));

    for row in &result.rows {
        let cells: Vec<String> = result
            .columns
            .iter()
            .map(|c| {
                let text = match row.get(c) {
                    None | Some(serde_json::Value::Null) => "NULL".to_string(),
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                };
                pad_right(&truncate_visual(&text, CELL_WIDTH), CELL_WIDTH)
            })
            .collect();
        println!("{}", cells.join(" "));
    }

    println!();
    if result.truncated {
        println!("{} row(s), {}", result.row_count, "truncated".yellow());
    } else {
        println!("{} row(s)", result.row_count);
    }
}

pub fn print_stats(stats: &BuildStats) {
    println!("{}", "Knowledge Graph".bold());
    println!("{}", "─".repeat(40));
    println!("  Nodes:         {}", stats.total_nodes.to_string().cyan());
    println!("  Edges:         {}", stats.total_edges.to_string().cyan());
    println!("  Avg degree:    {:.2}", stats.avg_connections);

    if !stats.nodes_by_type.is_empty() {
        println!();
        for (node_type, count) in &stats.nodes_by_type {
            println!("  {} {:>8}", pad_right(node_type, 24), count);
        }
    }
    if !stats.edges_by_type.is_empty() {
        println!();
        for (edge_type, count) in &stats.edges_by_type {
            println!("  {} {:>8}", pad_right(edge_type, 24).yellow(), count);
        }
    }
}

pub fn print_build_report(report: &BuildReport) {
    println!(
        "{} Graph built in {} {}",
        "✓".green().bold(),
        format!("{:.1}s", report.elapsed_ms as f64 / 1000.0).bold(),
        format!("({})", report.build_id).dimmed()
    );
    println!();
    print_stats(&report.stats);

    let skipped: Vec<&EntityOutcome> = report.skipped().collect();
    if !skipped.is_empty() {
        println!();
        println!("{}", "Skipped".yellow().bold());
        for outcome in skipped {
            if let EntityOutcome::Skipped { entity, reason } = outcome {
                println!("  {} {}: {}", "✗".red(), entity.cyan(), reason);
            }
        }
    }

    match (report.embedded_nodes, &report.embedding_error) {
        (_, Some(err)) => println!("\n{} Embeddings failed: {}", "⚠".yellow().bold(), err),
        (Some(n), None) => println!("\n  Embedded:      {}", n.to_string().cyan()),
        (None, None) => {}
    }
}

/// Print an agent's retrieval configuration.
pub fn print_config(agent: &str, data_source: Option<&str>, config: &RetrievalConfig) {
    match data_source {
        Some(ds) => println!("{} {}", agent.cyan().bold(), format!("@ {}", ds).dimmed()),
        None => println!("{}", agent.cyan().bold()),
    }
    println!("  SQL queries:      {}", on_off(config.enable_sql_queries));
    println!("  Semantic search:  {}", on_off(config.enable_semantic_search));
    println!("  Backend:          {}", config.search_backend.as_str());
    println!("  Mode:             {}", config.search_mode);
    if let Some(index) = &config.external_index_name {
        println!("  External index:   {}", index);
    }
    println!("  Max results:      {}", config.max_results);
    println!("  Threshold:        {:.2}", config.similarity_threshold);
}

fn on_off(enabled: bool) -> ColoredString {
    if enabled {
        "on".green()
    } else {
        "off".dimmed()
    }
}

/// Pad a plain string to a given visual width (right-padded).
fn pad_right(s: &str, width: usize) -> String {
    let visual = UnicodeWidthStr::width(s);
    if visual >= width {
        s.to_string()
    } else {
        format!("{}{}", s, " ".repeat(width - visual))
    }
}

/// Truncate a string respecting visual width.
fn truncate_visual(s: &str, max_width: usize) -> String {
    if UnicodeWidthStr::width(s) <= max_width {
        return s.to_string();
    }
    if max_width <= 3 {
        return ".".repeat(max_width);
    }
    let mut result = String::new();
    let mut current_width = 0;
    for ch in s.chars() {
        let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
        if current_width + ch_width > max_width - 2 {
            break;
        }
        result.push(ch);
        current_width += ch_width;
    }
    result.push_str("..");
    result
}
