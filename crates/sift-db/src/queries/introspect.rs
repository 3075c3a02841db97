//! Metadata introspection of user tables.
//!
//! Uses SQLite's table-valued pragma functions:
//! - `sqlite_master` for the table list
//! - `pragma_table_info` for columns and primary-key ordinals
//! - `pragma_foreign_key_list` for foreign keys
//! - `pragma_index_list` / `pragma_index_info` for unique indexes

use crate::pool::{quote_ident, DbError, DbPool, DbResult, INTERNAL_TABLE_PREFIX};
use rusqlite::params;

/// Column row from `pragma_table_info`.
#[derive(Debug, Clone)]
pub struct ColumnRow {
    pub name: String,
    pub data_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    /// 1-based position inside the primary key, 0 when not part of it.
    pub pk_position: i64,
}

/// One column pair of a foreign key.
#[derive(Debug, Clone)]
pub struct ForeignKeyRow {
    pub id: i64,
    pub seq: i64,
    pub from_column: String,
    pub to_table: String,
    /// `None` when the key implicitly targets the referenced primary key.
    pub to_column: Option<String>,
}

/// List user tables in name order, hiding SQLite and Sift internals.
pub fn list_tables(pool: &DbPool) -> DbResult<Vec<String>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let names = rows.collect::<Result<Vec<_>, _>>()?;
        Ok(names
            .into_iter()
            .filter(|n| !n.starts_with(INTERNAL_TABLE_PREFIX))
            .collect())
    })
}

/// Columns of a table in declaration order.
pub fn table_columns(pool: &DbPool, table: &str) -> DbResult<Vec<ColumnRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT name, type, \"notnull\", dflt_value, pk
             FROM pragma_table_info(?1) ORDER BY cid",
        )?;
        let rows = stmt.query_map(params![table], |row| {
            Ok(ColumnRow {
                name: row.get(0)?,
                data_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
                default_value: row.get(3)?,
                pk_position: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

/// Foreign keys declared on a table, ordered by key id then column sequence.
pub fn foreign_keys(pool: &DbPool, table: &str) -> DbResult<Vec<ForeignKeyRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, seq, \"table\", \"from\", \"to\"
             FROM pragma_foreign_key_list(?1) ORDER BY id, seq",
        )?;
        let rows = stmt.query_map(params![table], |row| {
            Ok(ForeignKeyRow {
                id: row.get(0)?,
                seq: row.get(1)?,
                to_table: row.get(2)?,
                from_column: row.get(3)?,
                to_column: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

/// Column sets covered by a unique index (including primary-key indexes).
pub fn unique_column_sets(pool: &DbPool, table: &str) -> DbResult<Vec<Vec<String>>> {
    pool.with_conn(|conn| {
        let mut list = conn.prepare(
            "SELECT name FROM pragma_index_list(?1) WHERE \"unique\" = 1 ORDER BY seq",
        )?;
        let index_names = list
            .query_map(params![table], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
        let mut sets = Vec::with_capacity(index_names.len());
        for index in index_names {
            let cols = info
                .query_map(params![index], |row| row.get::<_, Option<String>>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            // Expression indexes report NULL column names.
            if cols.iter().all(Option::is_some) {
                sets.push(cols.into_iter().flatten().collect());
            }
        }
        Ok(sets)
    })
}

/// Exact row count for a table.
pub fn count_rows(pool: &DbPool, table: &str) -> DbResult<i64> {
    pool.with_conn(|conn| {
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
            [],
            |row| row.get(0),
        )
        .map_err(DbError::from)
    })
}
