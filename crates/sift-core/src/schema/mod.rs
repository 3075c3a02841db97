//! Schema catalog: tables, columns, keys and join paths.

pub mod catalog;
pub mod model;

pub use catalog::{introspect_schema, SchemaCatalog};
pub use model::{
    Cardinality, ColumnInfo, ForeignKeyRef, SchemaDefinition, TableDefinition, TableRelationship,
};
