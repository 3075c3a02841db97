//! Sift Core Library
//!
//! Schema catalog, entity resolution, knowledge graph construction and
//! unified retrieval over a relational store.

pub mod cache;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod graph;
pub mod retrieval;
pub mod schema;

#[cfg(test)]
mod testing;

pub use config::SiftConfig;
pub use engine::{Adapters, SiftEngine};
pub use error::{SiftError, SiftResult};
