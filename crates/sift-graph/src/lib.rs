//! # Sift Graph
//!
//! Projects the persisted knowledge graph into Neo4j for graph
//! visualization and ad-hoc Cypher exploration.

pub mod client;
pub mod export;
pub mod schema;

pub use client::{GraphClient, GraphCounts};
pub use export::{export_graph, ExportResult};
