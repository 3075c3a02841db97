//! Schema catalog: cached introspection of the relational store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use sift_db::queries::introspect;
use sift_db::{DbPool, DbResult};

use crate::cache::{Clock, TtlCache};
use crate::error::SiftResult;
use super::model::{
    Cardinality, ColumnInfo, ForeignKeyRef, SchemaDefinition, TableDefinition, TableRelationship,
};

/// Cached view of tables, columns, keys and relationships.
pub struct SchemaCatalog {
    pool: DbPool,
    cache: TtlCache<SchemaDefinition>,
    generation: AtomicU64,
    /// Row counts keyed by schema generation; dropped when the schema reloads.
    row_counts: RwLock<(u64, HashMap<String, i64>)>,
}

impl SchemaCatalog {
    pub fn new(pool: DbPool, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            cache: TtlCache::new("schema", ttl, clock),
            generation: AtomicU64::new(0),
            row_counts: RwLock::new((0, HashMap::new())),
        }
    }

    /// The current schema, refreshed when the TTL has elapsed.
    pub fn get_schema(&self) -> SiftResult<Arc<SchemaDefinition>> {
        self.cache.get_or_refresh(|| -> SiftResult<SchemaDefinition> {
            let mut schema = introspect_schema(&self.pool)?;
            schema.generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            info!(
                tables = schema.tables.len(),
                relationships = schema.relationships.len(),
                "Schema catalog refreshed"
            );
            Ok(schema)
        })
    }

    pub fn get_table(&self, name: &str) -> SiftResult<Option<TableDefinition>> {
        let schema = self.get_schema()?;
        let table = schema.table(name).cloned();
        if table.is_none() {
            debug!(table = name, "Table not in catalog");
        }
        Ok(table)
    }

    /// Shortest join path; `None` means the tables are not connected.
    pub fn get_join_path(&self, from: &str, to: &str) -> SiftResult<Option<Vec<TableRelationship>>> {
        Ok(self.get_schema()?.join_path(from, to))
    }

    /// Row count for a table, 0 when it cannot be counted.
    pub fn get_row_count(&self, table: &str) -> i64 {
        let generation = match self.get_schema() {
            Ok(schema) if schema.table(table).is_some() => schema.generation,
            Ok(_) => return 0,
            Err(e) => {
                warn!(table, error = %e, "Schema unavailable for row count");
                return 0;
            }
        };

        if let Ok(counts) = self.row_counts.read() {
            if counts.0 == generation {
                if let Some(&n) = counts.1.get(table) {
                    return n;
                }
            }
        }

        match introspect::count_rows(&self.pool, table) {
            Ok(n) => {
                if let Ok(mut counts) = self.row_counts.write() {
                    if counts.0 != generation {
                        *counts = (generation, HashMap::new());
                    }
                    counts.1.insert(table.to_string(), n);
                }
                n
            }
            Err(e) => {
                warn!(table, error = %e, "Row count failed");
                0
            }
        }
    }

    /// Tables having a column with this name (case-insensitive), in table order.
    pub fn find_tables_with_column(&self, column: &str) -> SiftResult<Vec<String>> {
        let schema = self.get_schema()?;
        Ok(schema
            .tables
            .iter()
            .filter(|t| t.column(column).is_some())
            .map(|t| t.name.clone())
            .collect())
    }

    /// Force a reload on next access. Cached row counts go with it.
    pub fn clear_cache(&self) {
        self.cache.invalidate();
        if let Ok(mut counts) = self.row_counts.write() {
            counts.1.clear();
        }
    }
}

/// Read every user table and foreign key from the store.
pub fn introspect_schema(pool: &DbPool) -> DbResult<SchemaDefinition> {
    let names = introspect::list_tables(pool)?;

    let mut tables = Vec::with_capacity(names.len());
    let mut foreign_keys = Vec::new();
    let mut unique_sets: HashMap<String, Vec<Vec<String>>> = HashMap::new();

    for name in &names {
        let columns = introspect::table_columns(pool, name)?;
        let fks = introspect::foreign_keys(pool, name)?;
        unique_sets.insert(name.clone(), introspect::unique_column_sets(pool, name)?);

        let mut pk: Vec<(i64, String)> = columns
            .iter()
            .filter(|c| c.pk_position > 0)
            .map(|c| (c.pk_position, c.name.clone()))
            .collect();
        pk.sort();
        let primary_key: Vec<String> = pk.into_iter().map(|(_, n)| n).collect();

        let columns = columns
            .into_iter()
            .map(|c| ColumnInfo {
                foreign_key: fks.iter().find(|fk| fk.from_column == c.name).map(|fk| ForeignKeyRef {
                    table: fk.to_table.clone(),
                    column: fk.to_column.clone().unwrap_or_default(),
                }),
                is_primary_key: c.pk_position > 0,
                nullable: !c.not_null && c.pk_position == 0,
                name: c.name,
                data_type: c.data_type,
                default_value: c.default_value,
            })
            .collect();

        tables.push(TableDefinition {
            name: name.clone(),
            columns,
            primary_key,
        });
        foreign_keys.push((name.clone(), fks));
    }

    // Implicit targets (`REFERENCES t` without a column) point at t's key.
    let pk_of = |table: &str| -> String {
        tables
            .iter()
            .find(|t| t.name == table)
            .and_then(|t| t.primary_key.first().cloned())
            .unwrap_or_else(|| "rowid".to_string())
    };

    let mut relationships = Vec::new();
    for (from_table, fks) in &foreign_keys {
        // One relationship per declared key; composite keys use their first column pair.
        for fk in fks.iter().filter(|fk| fk.seq == 0) {
            let to_column = fk.to_column.clone().unwrap_or_else(|| pk_of(&fk.to_table));
            let from_def = tables.iter().find(|t| &t.name == from_table);
            let cardinality = classify(
                from_def,
                fks,
                &fk.from_column,
                unique_sets.get(from_table).map(Vec::as_slice).unwrap_or(&[]),
            );
            relationships.push(TableRelationship {
                from_table: from_table.clone(),
                from_column: fk.from_column.clone(),
                to_table: fk.to_table.clone(),
                to_column,
                cardinality,
            });
        }
    }

    for table in &mut tables {
        for column in &mut table.columns {
            if let Some(fk) = column.foreign_key.as_mut() {
                if fk.column.is_empty() {
                    fk.column = referenced_column(&relationships, &table.name, &column.name);
                }
            }
        }
    }

    Ok(SchemaDefinition::new(tables, relationships))
}

fn referenced_column(relationships: &[TableRelationship], table: &str, column: &str) -> String {
    relationships
        .iter()
        .find(|r| r.from_table == table && r.from_column == column)
        .map(|r| r.to_column.clone())
        .unwrap_or_default()
}

/// Cardinality of a foreign key seen from its owning table.
///
/// - many-to-many: the owning table is a junction (composite primary key
///   made only of foreign-key columns, referencing at least two keys)
/// - one-to-one: the key column is unique on its own
/// - one-to-many otherwise
fn classify(
    table: Option<&TableDefinition>,
    fks: &[introspect::ForeignKeyRow],
    column: &str,
    unique_sets: &[Vec<String>],
) -> Cardinality {
    let Some(table) = table else {
        return Cardinality::OneToMany;
    };

    let distinct_keys = fks.iter().map(|fk| fk.id).collect::<std::collections::HashSet<_>>().len();
    let pk_all_fk = table.primary_key.len() >= 2
        && table
            .primary_key
            .iter()
            .all(|pk| fks.iter().any(|fk| &fk.from_column == pk));
    if distinct_keys >= 2 && pk_all_fk {
        return Cardinality::ManyToMany;
    }

    let single_pk = table.primary_key.len() == 1 && table.primary_key[0] == column;
    let unique = unique_sets.iter().any(|set| set.len() == 1 && set[0] == column);
    if single_pk || unique {
        return Cardinality::OneToOne;
    }

    Cardinality::OneToMany
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ManualClock;
    use crate::testing;

    fn catalog() -> (SchemaCatalog, Arc<ManualClock>) {
        let pool = testing::commerce_pool();
        let clock = Arc::new(ManualClock::new());
        let catalog = SchemaCatalog::new(pool, Duration::from_secs(600), clock.clone());
        (catalog, clock)
    }

    #[test]
    fn test_tables_and_keys() {
        let (catalog, _) = catalog();
        let schema = catalog.get_schema().unwrap();
        let names: Vec<&str> = schema.table_names().collect();
        assert_eq!(names, vec!["customers", "order_items", "orders", "product_tags", "products", "profiles", "tags"]);

        let orders = catalog.get_table("orders").unwrap().unwrap();
        assert_eq!(orders.primary_key, vec!["id"]);
        let fk = orders.column("customer_id").unwrap().foreign_key.clone().unwrap();
        assert_eq!(fk.table, "customers");
        assert_eq!(fk.column, "id");

        assert!(catalog.get_table("sift_entities").unwrap().is_none());
        assert!(catalog.get_table("nope").unwrap().is_none());
    }

    #[test]
    fn test_cardinality_classification() {
        let (catalog, _) = catalog();
        let schema = catalog.get_schema().unwrap();
        let find = |from: &str, to: &str| {
            schema
                .relationships
                .iter()
                .find(|r| r.from_table == from && r.to_table == to)
                .unwrap()
                .cardinality
        };
        assert_eq!(find("orders", "customers"), Cardinality::OneToMany);
        assert_eq!(find("product_tags", "tags"), Cardinality::ManyToMany);
        assert_eq!(find("profiles", "customers"), Cardinality::OneToOne);
    }

    #[test]
    fn test_join_paths() {
        let (catalog, _) = catalog();
        assert_eq!(catalog.get_join_path("orders", "orders").unwrap(), Some(vec![]));

        let path = catalog.get_join_path("customers", "products").unwrap().unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0].from_table, "orders");
        assert_eq!(path[2].to_table, "products");

        assert_eq!(catalog.get_join_path("customers", "missing").unwrap(), None);
    }

    #[test]
    fn test_row_count_and_failures() {
        let (catalog, _) = catalog();
        assert_eq!(catalog.get_row_count("customers"), 3);
        assert_eq!(catalog.get_row_count("missing"), 0);
    }

    #[test]
    fn test_find_tables_with_column() {
        let (catalog, _) = catalog();
        let tables = catalog.find_tables_with_column("CUSTOMER_ID").unwrap();
        assert_eq!(tables, vec!["orders", "profiles"]);
    }

    #[test]
    fn test_cache_hit_and_clear() {
        let (catalog, clock) = catalog();
        let first = catalog.get_schema().unwrap();
        catalog.pool.execute_batch("CREATE TABLE late (id INTEGER PRIMARY KEY);").unwrap();

        clock.advance(Duration::from_secs(60));
        let second = catalog.get_schema().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.table("late").is_none());

        catalog.clear_cache();
        assert!(catalog.get_schema().unwrap().table("late").is_some());
    }

    #[test]
    fn test_row_counts_reset_with_schema() {
        let (catalog, _) = catalog();
        assert_eq!(catalog.get_row_count("customers"), 3);
        catalog
            .pool
            .execute_batch("INSERT INTO customers (id, name, email, lifetime_value) VALUES (9, 'Late', 'l@x.io', 0);")
            .unwrap();
        assert_eq!(catalog.get_row_count("customers"), 3);

        catalog.clear_cache();
        assert_eq!(catalog.get_row_count("customers"), 4);
    }
}
