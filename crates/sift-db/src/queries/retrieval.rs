//! Retrieval configuration queries (agent x data source).

use crate::pool::{DbError, DbPool, DbResult};
use rusqlite::{params, OptionalExtension};

/// Retrieval configuration row. An empty `data_source_id` is the agent default.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalConfigRow {
    pub agent_id: String,
    pub data_source_id: String,
    pub enable_sql_queries: bool,
    pub enable_semantic_search: bool,
    pub search_backend: String,
    pub search_mode: String,
    pub external_index_name: Option<String>,
    pub max_results: i64,
    pub similarity_threshold: f64,
}

fn read_config(row: &rusqlite::Row<'_>) -> rusqlite::Result<RetrievalConfigRow> {
    Ok(RetrievalConfigRow {
        agent_id: row.get(0)?,
        data_source_id: row.get(1)?,
        enable_sql_queries: row.get::<_, i64>(2)? != 0,
        enable_semantic_search: row.get::<_, i64>(3)? != 0,
        search_backend: row.get(4)?,
        search_mode: row.get(5)?,
        external_index_name: row.get(6)?,
        max_results: row.get(7)?,
        similarity_threshold: row.get(8)?,
    })
}

/// Find the configuration for an agent, preferring the data-source specific
/// record and falling back to the agent default.
pub fn find_config(
    pool: &DbPool,
    agent_id: &str,
    data_source_id: Option<&str>,
) -> DbResult<Option<RetrievalConfigRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT agent_id, data_source_id, enable_sql_queries, enable_semantic_search,
                    search_backend, search_mode, external_index_name, max_results,
                    similarity_threshold
             FROM sift_retrieval_configs
             WHERE agent_id = ?1 AND data_source_id = ?2",
        )?;

        if let Some(ds) = data_source_id.filter(|ds| !ds.is_empty()) {
            let specific = stmt.query_row(params![agent_id, ds], read_config).optional()?;
            if specific.is_some() {
                return Ok(specific);
            }
        }

        stmt.query_row(params![agent_id, ""], read_config)
            .optional()
            .map_err(DbError::from)
    })
}

/// Insert or replace a configuration record.
pub fn save_config(pool: &DbPool, row: &RetrievalConfigRow) -> DbResult<()> {
    pool.with_conn(|conn| {
        conn.execute(
            "INSERT INTO sift_retrieval_configs
                 (agent_id, data_source_id, enable_sql_queries, enable_semantic_search,
                  search_backend, search_mode, external_index_name, max_results, similarity_threshold)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(agent_id, data_source_id) DO UPDATE SET
                 enable_sql_queries = excluded.enable_sql_queries,
                 enable_semantic_search = excluded.enable_semantic_search,
                 search_backend = excluded.search_backend,
                 search_mode = excluded.search_mode,
                 external_index_name = excluded.external_index_name,
                 max_results = excluded.max_results,
                 similarity_threshold = excluded.similarity_threshold,
                 updated_at = datetime('now')",
            params![
                row.agent_id,
                row.data_source_id,
                row.enable_sql_queries as i64,
                row.enable_semantic_search as i64,
                row.search_backend,
                row.search_mode,
                row.external_index_name,
                row.max_results,
                row.similarity_threshold
            ],
        )?;
        Ok(())
    })
}

/// All configuration records for an agent.
pub fn list_configs(pool: &DbPool, agent_id: &str) -> DbResult<Vec<RetrievalConfigRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT agent_id, data_source_id, enable_sql_queries, enable_semantic_search,
                    search_backend, search_mode, external_index_name, max_results,
                    similarity_threshold
             FROM sift_retrieval_configs WHERE agent_id = ?1 ORDER BY data_source_id",
        )?;
        let rows = stmt.query_map(params![agent_id], read_config)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_migrations;

    fn row(agent: &str, ds: &str, sql: bool) -> RetrievalConfigRow {
        RetrievalConfigRow {
            agent_id: agent.to_string(),
            data_source_id: ds.to_string(),
            enable_sql_queries: sql,
            enable_semantic_search: true,
            search_backend: "postgres".to_string(),
            search_mode: "hybrid".to_string(),
            external_index_name: None,
            max_results: 10,
            similarity_threshold: 0.5,
        }
    }

    #[test]
    fn test_data_source_falls_back_to_agent_default() {
        let pool = DbPool::in_memory().unwrap();
        run_migrations(&pool).unwrap();
        save_config(&pool, &row("support", "", false)).unwrap();
        save_config(&pool, &row("support", "crm", true)).unwrap();

        let crm = find_config(&pool, "support", Some("crm")).unwrap().unwrap();
        assert!(crm.enable_sql_queries);

        let other = find_config(&pool, "support", Some("billing")).unwrap().unwrap();
        assert!(!other.enable_sql_queries);
        assert_eq!(other.data_source_id, "");

        assert!(find_config(&pool, "sales", None).unwrap().is_none());
        assert_eq!(list_configs(&pool, "support").unwrap().len(), 2);
    }
}
