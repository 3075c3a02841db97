//! # Sift DB
//!
//! SQLite layer for Sift.
//!
//! Owns the connection pool, the migrations for Sift's own metadata tables,
//! metadata introspection of user tables, and persistence for entities,
//! retrieval configuration and the materialized knowledge graph.

pub mod migrations;
pub mod pool;
pub mod queries;

pub use migrations::run_migrations;
pub use pool::{DbError, DbPool, DbResult, INTERNAL_TABLE_PREFIX};

/// Open a database file and bring its metadata tables up to date.
pub fn init_pool(path: &std::path::Path) -> DbResult<DbPool> {
    let pool = DbPool::open(path)?;
    run_migrations(&pool)?;
    tracing::debug!(path = %path.display(), "Database ready");
    Ok(pool)
}
