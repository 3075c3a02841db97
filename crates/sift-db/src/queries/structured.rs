//! Read-only structured queries.

use crate::pool::{DbError, DbPool, DbResult};
use crate::queries::rows::CellValue;

/// Result of a structured query.
#[derive(Debug, Clone, Default)]
pub struct SelectResult {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    /// True when more rows existed than `max_rows`.
    pub truncated: bool,
}

/// Run a statement that SQLite itself reports as read-only.
///
/// Anything that would write (including `SELECT` wrapped around a writing
/// CTE) is rejected before a single row is stepped.
pub fn run_select(pool: &DbPool, sql: &str, max_rows: usize) -> DbResult<SelectResult> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(DbError::ReadOnlyViolation(sql.to_string()));
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        let mut truncated = false;

        while let Some(row) = rows.next()? {
            if out.len() >= max_rows {
                truncated = true;
                break;
            }
            let mut map = serde_json::Map::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                map.insert(name.clone(), CellValue::from(row.get_ref(idx)?).to_json());
            }
            out.push(map);
        }

        Ok(SelectResult {
            columns,
            rows: out,
            truncated,
        })
    })
}
