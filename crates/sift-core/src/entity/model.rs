//! Semantic entity models.

use serde::{Deserialize, Serialize};
use sift_db::queries::entities::EntityRow;

/// Semantic type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    Timestamp,
    Identifier,
    Structured,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp",
            Self::Identifier => "identifier",
            Self::Structured => "structured",
        }
    }

    /// Infer a field type from a declared SQL column type.
    pub fn from_sql_type(sql_type: &str) -> Self {
        let t = sql_type.to_lowercase();
        if t.contains("bool") {
            Self::Boolean
        } else if t.contains("timestamp") || t.contains("datetime") {
            Self::Timestamp
        } else if t.contains("date") {
            Self::Date
        } else if t.contains("int") {
            Self::Integer
        } else if t.contains("real") || t.contains("floa") || t.contains("doub") || t.contains("dec") || t.contains("num") {
            Self::Decimal
        } else if t.contains("json") {
            Self::Structured
        } else {
            Self::Text
        }
    }
}

/// A column viewed through its business meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub filterable: bool,
}

/// A named link from one entity to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRelationship {
    pub target: String,
    /// Relationship kind, e.g. `HAS_MANY`, `BELONGS_TO`.
    pub kind: String,
    /// Edge weight multiplier for this relationship only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// A business concept bound to one source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticEntity {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub source_table: String,
    #[serde(default)]
    pub domain_owner: Option<String>,
    #[serde(default)]
    pub fields: Vec<SemanticField>,
    /// Explicit aliases only; name and display name are implicit.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<EntityRelationship>,
    /// Configured importance weight, 1.0 by default.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl SemanticEntity {
    pub fn new(name: &str, display_name: &str, source_table: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            description: None,
            source_table: source_table.to_string(),
            domain_owner: None,
            fields: Vec::new(),
            aliases: Vec::new(),
            relationships: Vec::new(),
            weight: 1.0,
        }
    }

    /// Create from a database row plus its explicit aliases.
    pub fn from_row(row: EntityRow, aliases: Vec<String>) -> Self {
        let fields: Vec<SemanticField> = serde_json::from_str(&row.fields).unwrap_or_default();
        let relationships: Vec<EntityRelationship> =
            serde_json::from_str(&row.relationships).unwrap_or_default();

        Self {
            name: row.name,
            display_name: row.display_name,
            description: row.description,
            source_table: row.source_table,
            domain_owner: row.domain_owner,
            fields,
            aliases,
            relationships,
            weight: row.weight,
        }
    }

    pub fn field(&self, name: &str) -> Option<&SemanticField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Searchable text-like fields.
    pub fn searchable_fields(&self) -> impl Iterator<Item = &SemanticField> {
        self.fields
            .iter()
            .filter(|f| f.searchable && matches!(f.field_type, FieldType::Text | FieldType::Identifier))
    }
}

/// How an entity mention was matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Alias,
    Fuzzy,
}

impl MatchType {
    pub fn confidence(&self) -> f64 {
        match self {
            Self::Exact => 1.0,
            Self::Alias => 0.95,
            Self::Fuzzy => 0.70,
        }
    }
}

/// An entity found in a piece of text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEntity {
    pub entity: SemanticEntity,
    pub matched_alias: String,
    pub confidence: f64,
    pub match_type: MatchType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_type_from_sql() {
        assert_eq!(FieldType::from_sql_type("INTEGER"), FieldType::Integer);
        assert_eq!(FieldType::from_sql_type("NUMERIC(10,2)"), FieldType::Decimal);
        assert_eq!(FieldType::from_sql_type("DATETIME"), FieldType::Timestamp);
        assert_eq!(FieldType::from_sql_type("date"), FieldType::Date);
        assert_eq!(FieldType::from_sql_type("BOOLEAN"), FieldType::Boolean);
        assert_eq!(FieldType::from_sql_type("VARCHAR(20)"), FieldType::Text);
        assert_eq!(FieldType::from_sql_type(""), FieldType::Text);
    }

    #[test]
    fn test_from_row_tolerates_bad_json() {
        let row = EntityRow {
            name: "customer".into(),
            display_name: "Customer".into(),
            description: None,
            source_table: "customers".into(),
            domain_owner: None,
            fields: "not json".into(),
            relationships: r#"[{"target":"order","kind":"HAS_MANY"}]"#.into(),
            weight: 1.5,
            created_at: String::new(),
            updated_at: String::new(),
        };
        let entity = SemanticEntity::from_row(row, vec!["client".into()]);
        assert!(entity.fields.is_empty());
        assert_eq!(entity.relationships[0].target, "order");
        assert_eq!(entity.relationships[0].weight, None);
        assert_eq!(entity.aliases, vec!["client"]);
    }
}
