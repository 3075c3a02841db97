//! Knowledge graph persistence.
//!
//! The graph is always written as a whole: [`replace_graph`] swaps the
//! previous node and edge sets for new ones inside a single transaction, so
//! readers see either the old graph or the new one.

use crate::pool::{DbError, DbPool, DbResult};
use rusqlite::{params, OptionalExtension};

/// Graph node row. `properties` is a JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub id: String,
    pub node_type: String,
    pub name: String,
    pub properties: String,
    pub importance_score: f64,
    pub source_table: Option<String>,
    pub source_id: Option<String>,
}

/// Graph edge row.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeRow {
    pub source_id: String,
    pub target_id: String,
    pub relationship_type: String,
    pub weight: f64,
}

/// Build history row.
#[derive(Debug, Clone)]
pub struct BuildRow {
    pub id: String,
    pub started_at: String,
    pub finished_at: String,
    pub total_nodes: i64,
    pub total_edges: i64,
    pub skipped_entities: String,
}

fn read_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok(NodeRow {
        id: row.get(0)?,
        node_type: row.get(1)?,
        name: row.get(2)?,
        properties: row.get(3)?,
        importance_score: row.get(4)?,
        source_table: row.get(5)?,
        source_id: row.get(6)?,
    })
}

fn read_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<EdgeRow> {
    Ok(EdgeRow {
        source_id: row.get(0)?,
        target_id: row.get(1)?,
        relationship_type: row.get(2)?,
        weight: row.get(3)?,
    })
}

/// Replace the persisted graph atomically and record the build.
pub fn replace_graph(
    pool: &DbPool,
    build: &BuildRow,
    nodes: &[NodeRow],
    edges: &[EdgeRow],
) -> DbResult<()> {
    pool.with_conn_mut(|conn| {
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM sift_graph_edges", [])?;
        tx.execute("DELETE FROM sift_graph_nodes", [])?;

        {
            let mut insert_node = tx.prepare(
                "INSERT INTO sift_graph_nodes
                     (id, node_type, name, properties, importance_score, source_table, source_id, build_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for node in nodes {
                insert_node.execute(params![
                    node.id,
                    node.node_type,
                    node.name,
                    node.properties,
                    node.importance_score,
                    node.source_table,
                    node.source_id,
                    build.id
                ])?;
            }

            let mut insert_edge = tx.prepare(
                "INSERT INTO sift_graph_edges (source_id, target_id, relationship_type, weight, build_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for edge in edges {
                insert_edge.execute(params![
                    edge.source_id,
                    edge.target_id,
                    edge.relationship_type,
                    edge.weight,
                    build.id
                ])?;
            }

            tx.execute(
                "INSERT INTO sift_graph_builds
                     (id, started_at, finished_at, total_nodes, total_edges, skipped_entities)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    build.id,
                    build.started_at,
                    build.finished_at,
                    build.total_nodes,
                    build.total_edges,
                    build.skipped_entities
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    })
}

/// Node counts grouped by type, ordered by type.
pub fn count_nodes_by_type(pool: &DbPool) -> DbResult<Vec<(String, i64)>> {
    grouped_counts(
        pool,
        "SELECT node_type, COUNT(*) FROM sift_graph_nodes GROUP BY node_type ORDER BY node_type",
    )
}

/// Edge counts grouped by relationship type, ordered by type.
pub fn count_edges_by_type(pool: &DbPool) -> DbResult<Vec<(String, i64)>> {
    grouped_counts(
        pool,
        "SELECT relationship_type, COUNT(*) FROM sift_graph_edges
         GROUP BY relationship_type ORDER BY relationship_type",
    )
}

fn grouped_counts(pool: &DbPool, sql: &str) -> DbResult<Vec<(String, i64)>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

/// Nodes ordered by importance (highest first), then id.
pub fn list_nodes(pool: &DbPool, limit: usize) -> DbResult<Vec<NodeRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, node_type, name, properties, importance_score, source_table, source_id
             FROM sift_graph_nodes ORDER BY importance_score DESC, id LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], read_node)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

/// Every persisted edge.
pub fn list_edges(pool: &DbPool) -> DbResult<Vec<EdgeRow>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT source_id, target_id, relationship_type, weight
             FROM sift_graph_edges ORDER BY source_id, target_id, relationship_type",
        )?;
        let rows = stmt.query_map([], read_edge)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

/// Get one node by id.
pub fn get_node(pool: &DbPool, id: &str) -> DbResult<NodeRow> {
    pool.with_conn(|conn| {
        conn.query_row(
            "SELECT id, node_type, name, properties, importance_score, source_table, source_id
             FROM sift_graph_nodes WHERE id = ?1",
            params![id],
            read_node,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(format!("Node: {}", id)),
            e => DbError::Connection(e),
        })
    })
}

/// Nodes adjacent to `id` in either direction, with the connecting edge.
pub fn neighbors(pool: &DbPool, id: &str) -> DbResult<Vec<(EdgeRow, NodeRow)>> {
    pool.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT e.source_id, e.target_id, e.relationship_type, e.weight,
                    n.id, n.node_type, n.name, n.properties, n.importance_score, n.source_table, n.source_id
             FROM sift_graph_edges e
             JOIN sift_graph_nodes n
               ON n.id = CASE WHEN e.source_id = ?1 THEN e.target_id ELSE e.source_id END
             WHERE e.source_id = ?1 OR e.target_id = ?1
             ORDER BY n.importance_score DESC, n.id",
        )?;
        let rows = stmt.query_map(params![id], |row| {
            let edge = read_edge(row)?;
            let node = NodeRow {
                id: row.get(4)?,
                node_type: row.get(5)?,
                name: row.get(6)?,
                properties: row.get(7)?,
                importance_score: row.get(8)?,
                source_table: row.get(9)?,
                source_id: row.get(10)?,
            };
            Ok((edge, node))
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(DbError::from)
    })
}

/// Most recent build, if any.
pub fn latest_build(pool: &DbPool) -> DbResult<Option<BuildRow>> {
    pool.with_conn(|conn| {
        conn.query_row(
            "SELECT id, started_at, finished_at, total_nodes, total_edges, skipped_entities
             FROM sift_graph_builds ORDER BY finished_at DESC, rowid DESC LIMIT 1",
            [],
            |row| {
                Ok(BuildRow {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    total_nodes: row.get(3)?,
                    total_edges: row.get(4)?,
                    skipped_entities: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(DbError::from)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_migrations;

    fn node(id: &str, node_type: &str, score: f64) -> NodeRow {
        NodeRow {
            id: id.to_string(),
            node_type: node_type.to_string(),
            name: id.to_string(),
            properties: "{}".to_string(),
            importance_score: score,
            source_table: None,
            source_id: None,
        }
    }

    fn build(id: &str, nodes: i64, edges: i64) -> BuildRow {
        BuildRow {
            id: id.to_string(),
            started_at: "2026-01-01T00:00:00Z".to_string(),
            finished_at: format!("2026-01-01T00:00:0{}Z", nodes),
            total_nodes: nodes,
            total_edges: edges,
            skipped_entities: "[]".to_string(),
        }
    }

    #[test]
    fn test_replace_graph_swaps_everything() {
        let pool = DbPool::in_memory().unwrap();
        run_migrations(&pool).unwrap();

        let edge = EdgeRow {
            source_id: "order:1".to_string(),
            target_id: "customer:1".to_string(),
            relationship_type: "BELONGS_TO".to_string(),
            weight: 1.0,
        };
        replace_graph(
            &pool,
            &build("b1", 2, 1),
            &[node("customer:1", "customer", 0.9), node("order:1", "order", 0.2)],
            &[edge],
        )
        .unwrap();
        assert_eq!(neighbors(&pool, "customer:1").unwrap().len(), 1);

        replace_graph(&pool, &build("b2", 1, 0), &[node("customer:2", "customer", 0.5)], &[]).unwrap();

        assert_eq!(count_nodes_by_type(&pool).unwrap(), vec![("customer".to_string(), 1)]);
        assert!(count_edges_by_type(&pool).unwrap().is_empty());
        assert!(matches!(get_node(&pool, "customer:1"), Err(DbError::NotFound(_))));
        assert_eq!(latest_build(&pool).unwrap().unwrap().id, "b2");
    }

    #[test]
    fn test_failed_replace_keeps_previous_graph() {
        let pool = DbPool::in_memory().unwrap();
        run_migrations(&pool).unwrap();
        replace_graph(&pool, &build("b1", 1, 0), &[node("a", "t", 0.1)], &[]).unwrap();

        // Duplicate node ids violate the primary key and abort the transaction.
        let result = replace_graph(&pool, &build("b2", 2, 0), &[node("x", "t", 0.1), node("x", "t", 0.1)], &[]);
        assert!(result.is_err());

        let nodes = list_nodes(&pool, 10).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "a");
    }
}
