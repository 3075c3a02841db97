//! Neo4j schema initialization (constraints and indexes).

use anyhow::Result;
use neo4rs::Query;
use tracing::info;

use crate::GraphClient;

const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE CONSTRAINT sift_node_id IF NOT EXISTS FOR (n:SiftNode) REQUIRE n.id IS UNIQUE",
    "CREATE INDEX sift_node_type IF NOT EXISTS FOR (n:SiftNode) ON (n.type)",
    "CREATE FULLTEXT INDEX sift_node_search IF NOT EXISTS FOR (n:SiftNode) ON EACH [n.name, n.content]",
];

/// Create constraints and indexes. Safe to run repeatedly.
pub async fn initialize_schema(client: &GraphClient) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        client.execute(Query::new(statement.to_string())).await?;
    }
    info!(statements = SCHEMA_STATEMENTS.len(), "Neo4j schema initialized");
    Ok(())
}
