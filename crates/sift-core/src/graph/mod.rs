//! Knowledge graph: typed nodes and weighted edges materialized from entity rows.

pub mod builder;
pub mod ingest;
pub mod model;
pub mod scoring;

pub use builder::{KnowledgeGraph, NodeIndexer};
pub use model::{
    BuildOptions, BuildReport, BuildStats, BuildSummary, CancelFlag, EntityOutcome, GraphEdge, GraphNode,
    GraphSnapshot, Properties, PropertyValue,
};
