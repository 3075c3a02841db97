//! Database query implementations.

pub mod entities;
pub mod graph;
pub mod introspect;
pub mod retrieval;
pub mod rows;
pub mod structured;
