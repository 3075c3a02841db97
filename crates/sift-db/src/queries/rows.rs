//! Row scans over user tables.
//!
//! Values come back as [`CellValue`], the raw SQLite storage classes.
//! Interpretation (booleans, timestamps) happens at the ingestion boundary
//! in `sift-core`.

use crate::pool::{quote_ident, DbError, DbPool, DbResult};
use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Row};

/// Column alias used when a table has no declared primary key.
pub const ROWID_COLUMN: &str = "__rowid";

/// A raw SQLite value.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl CellValue {
    /// Render the value as a join key. Nulls and blobs never join.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Self::Integer(i) => Some(i.to_string()),
            Self::Real(f) => Some(f.to_string()),
            Self::Text(s) => Some(s.clone()),
            Self::Null | Self::Blob(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Real(f) => Some(*f),
            Self::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Integer(i) => serde_json::json!(i),
            Self::Real(f) => serde_json::json!(f),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Blob(b) => serde_json::json!(format!("<{} bytes>", b.len())),
        }
    }
}

impl From<ValueRef<'_>> for CellValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(f) => Self::Real(f),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        }
    }
}

/// One scanned row, columns in select order.
#[derive(Debug, Clone, Default)]
pub struct RowRecord {
    pub cells: Vec<(String, CellValue)>,
}

impl RowRecord {
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.cells
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }
}

fn read_record(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<RowRecord> {
    let mut cells = Vec::with_capacity(columns.len());
    for (idx, name) in columns.iter().enumerate() {
        cells.push((name.clone(), CellValue::from(row.get_ref(idx)?)));
    }
    Ok(RowRecord { cells })
}

fn key_clause(key_columns: &[String]) -> (String, String) {
    if key_columns.is_empty() {
        (
            format!("rowid AS {}, ", quote_ident(ROWID_COLUMN)),
            "rowid".to_string(),
        )
    } else {
        let order = key_columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        (String::new(), order)
    }
}

/// Scan up to `limit` rows of a table in key order.
///
/// When `key_columns` is empty the table's rowid is selected as
/// [`ROWID_COLUMN`] so every row still has a stable identity.
pub fn scan_rows(
    pool: &DbPool,
    table: &str,
    key_columns: &[String],
    limit: usize,
) -> DbResult<Vec<RowRecord>> {
    let (rowid, order) = key_clause(key_columns);
    let sql = format!(
        "SELECT {}* FROM {} ORDER BY {} LIMIT ?1",
        rowid,
        quote_ident(table),
        order
    );

    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(&sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let rows = stmt.query_map([limit as i64], |row| read_record(row, &columns))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

/// Rows where any of `columns` contains any of `terms` (case-insensitive `LIKE`).
pub fn search_rows(
    pool: &DbPool,
    table: &str,
    key_columns: &[String],
    columns: &[String],
    terms: &[String],
    limit: usize,
) -> DbResult<Vec<RowRecord>> {
    if columns.is_empty() || terms.is_empty() {
        return Ok(Vec::new());
    }

    let mut predicates = Vec::with_capacity(columns.len() * terms.len());
    for term_idx in 0..terms.len() {
        for column in columns {
            predicates.push(format!(
                "{} LIKE ?{} ESCAPE '\\'",
                quote_ident(column),
                term_idx + 1
            ));
        }
    }

    let (rowid, order) = key_clause(key_columns);
    let sql = format!(
        "SELECT {}* FROM {} WHERE {} ORDER BY {} LIMIT {}",
        rowid,
        quote_ident(table),
        predicates.join(" OR "),
        order,
        limit
    );

    let patterns: Vec<String> = terms.iter().map(|t| format!("%{}%", escape_like(t))).collect();

    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let rows = stmt.query_map(params_from_iter(patterns.iter()), |row| read_record(row, &names))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> DbPool {
        let pool = DbPool::in_memory().unwrap();
        pool.execute_batch(
            "CREATE TABLE products (id INTEGER PRIMARY KEY, name TEXT, price REAL, photo BLOB);
             INSERT INTO products VALUES (2, 'Steel Widget', 9.5, x'00');
             INSERT INTO products VALUES (1, 'Copper 100% Gear', 20, NULL);
             CREATE TABLE notes (body TEXT);
             INSERT INTO notes VALUES ('first'), ('second');",
        )
        .unwrap();
        pool
    }

    #[test]
    fn test_scan_orders_by_key() {
        let pool = fixture();
        let rows = scan_rows(&pool, "products", &["id".to_string()], 10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("id"), Some(&CellValue::Integer(1)));
        assert_eq!(rows[1].get("photo"), Some(&CellValue::Blob(vec![0])));
    }

    #[test]
    fn test_scan_without_key_selects_rowid() {
        let pool = fixture();
        let rows = scan_rows(&pool, "notes", &[], 1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get(ROWID_COLUMN), Some(&CellValue::Integer(1)));
    }

    #[test]
    fn test_search_rows_escapes_wildcards() {
        let pool = fixture();
        let cols = vec!["name".to_string()];
        let key = vec!["id".to_string()];

        let hits = search_rows(&pool, "products", &key, &cols, &["widget".to_string()], 10).unwrap();
        assert_eq!(hits.len(), 1);

        let pct = search_rows(&pool, "products", &key, &cols, &["100%".to_string()], 10).unwrap();
        assert_eq!(pct.len(), 1);
        assert_eq!(pct[0].get("name").and_then(CellValue::as_text), Some("Copper 100% Gear"));
    }

    #[test]
    fn test_cell_value_keys() {
        assert_eq!(CellValue::Integer(7).as_key().as_deref(), Some("7"));
        assert_eq!(CellValue::Null.as_key(), None);
        assert_eq!(CellValue::Text(" 3.5 ".into()).as_f64(), Some(3.5));
    }
}
