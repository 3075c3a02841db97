//! Semantic entity and alias queries.

use crate::pool::{DbError, DbPool, DbResult};
use rusqlite::{params, OptionalExtension};

/// Semantic entity row. `fields` and `relationships` are JSON arrays.
#[derive(Debug, Clone)]
pub struct EntityRow {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub source_table: String,
    pub domain_owner: Option<String>,
    pub fields: String,
    pub relationships: String,
    pub weight: f64,
    pub created_at: String,
    pub updated_at: String,
}

/// Explicit alias row.
#[derive(Debug, Clone)]
pub struct AliasRow {
    pub id: i64,
    pub alias: String,
    pub entity_name: String,
}

const ENTITY_COLUMNS: &str = "name, display_name, description, source_table, domain_owner,
                              fields, relationships, weight, created_at, updated_at";

fn read_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityRow> {
    Ok(EntityRow {
        name: row.get(0)?,
        display_name: row.get(1)?,
        description: row.get(2)?,
        source_table: row.get(3)?,
        domain_owner: row.get(4)?,
        fields: row.get(5)?,
        relationships: row.get(6)?,
        weight: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

/// List all entities ordered by name.
pub fn list_entities(pool: &DbPool) -> DbResult<Vec<EntityRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM sift_entities ORDER BY name",
            ENTITY_COLUMNS
        ))?;
        let rows = stmt.query_map([], read_entity)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

/// Get one entity by name.
pub fn get_entity(pool: &DbPool, name: &str) -> DbResult<EntityRow> {
    pool.with_conn(|conn| {
        conn.query_row(
            &format!("SELECT {} FROM sift_entities WHERE name = ?1", ENTITY_COLUMNS),
            params![name],
            read_entity,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("Entity: {}", name)),
            e => DbError::Connection(e),
        })
    })
}

/// Insert an entity or update every attribute except its name.
#[allow(clippy::too_many_arguments)]
pub fn upsert_entity(
    pool: &DbPool,
    name: &str,
    display_name: &str,
    description: Option<&str>,
    source_table: &str,
    domain_owner: Option<&str>,
    fields_json: &str,
    relationships_json: &str,
    weight: f64,
) -> DbResult<()> {
    pool.with_conn(|conn| {
        conn.execute(
            "INSERT INTO sift_entities
                 (name, display_name, description, source_table, domain_owner, fields, relationships, weight)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(name) DO UPDATE SET
                 display_name = excluded.display_name,
                 description = excluded.description,
                 source_table = excluded.source_table,
                 domain_owner = excluded.domain_owner,
                 fields = excluded.fields,
                 relationships = excluded.relationships,
                 weight = excluded.weight,
                 updated_at = datetime('now')",
            params![
                name,
                display_name,
                description,
                source_table,
                domain_owner,
                fields_json,
                relationships_json,
                weight
            ],
        )?;
        Ok(())
    })
}

/// Delete an entity. Its aliases cascade.
pub fn delete_entity(pool: &DbPool, name: &str) -> DbResult<()> {
    pool.with_conn(|conn| {
        let deleted = conn.execute("DELETE FROM sift_entities WHERE name = ?1", params![name])?;
        if deleted == 0 {
            return Err(DbError::NotFound(format!("Entity: {}", name)));
        }
        Ok(())
    })
}

/// All explicit aliases in registration order.
pub fn list_aliases(pool: &DbPool) -> DbResult<Vec<AliasRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, alias, entity_name FROM sift_entity_aliases ORDER BY id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(AliasRow {
                id: row.get(0)?,
                alias: row.get(1)?,
                entity_name: row.get(2)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

/// Register an alias. Re-registering an existing pair is a no-op.
pub fn add_alias(pool: &DbPool, alias: &str, entity_name: &str) -> DbResult<()> {
    pool.with_conn(|conn| {
        let exists: Option<String> = conn
            .query_row(
                "SELECT name FROM sift_entities WHERE name = ?1",
                params![entity_name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(DbError::NotFound(format!("Entity: {}", entity_name)));
        }

        conn.execute(
            "INSERT OR IGNORE INTO sift_entity_aliases (alias, entity_name) VALUES (?1, ?2)",
            params![alias, entity_name],
        )?;
        Ok(())
    })
}

/// Remove an alias from an entity.
pub fn remove_alias(pool: &DbPool, alias: &str, entity_name: &str) -> DbResult<()> {
    pool.with_conn(|conn| {
        let deleted = conn.execute(
            "DELETE FROM sift_entity_aliases WHERE alias = ?1 AND entity_name = ?2",
            params![alias, entity_name],
        )?;
        if deleted == 0 {
            return Err(DbError::NotFound(format!("Alias: {} -> {}", alias, entity_name)));
        }
        Ok(())
    })
}
