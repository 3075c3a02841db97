//! Semantic entities and their resolution from free text.

pub mod model;
pub mod resolver;

pub use model::{EntityRelationship, FieldType, MatchType, ResolvedEntity, SemanticEntity, SemanticField};
pub use resolver::{EntityIndex, EntityResolver};
