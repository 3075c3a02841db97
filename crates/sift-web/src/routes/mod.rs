//! Route handlers.

pub mod agents;
pub mod entities;
pub mod graph;
pub mod retrieval;
pub mod schema;
