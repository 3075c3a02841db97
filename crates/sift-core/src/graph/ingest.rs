//! Row ingestion: raw cells in, typed graph nodes out.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use tracing::debug;

use sift_db::queries::rows::{CellValue, RowRecord, ROWID_COLUMN};

use crate::entity::{FieldType, SemanticEntity};
use super::model::{GraphNode, Properties, PropertyValue};

/// Stable identity of a row: its primary-key values joined by `:`, or the
/// rowid when the table has no declared key. `None` if any part is null.
pub fn source_id(record: &RowRecord, key_columns: &[String]) -> Option<String> {
    if key_columns.is_empty() {
        return record.get(ROWID_COLUMN).and_then(CellValue::as_key);
    }
    let parts = key_columns
        .iter()
        .map(|c| record.get(c).and_then(CellValue::as_key))
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join(":"))
}

/// Coerce a raw cell into a property. `None` means the value is dropped.
pub fn coerce(value: &CellValue, field_type: Option<FieldType>) -> Option<PropertyValue> {
    if matches!(value, CellValue::Null) {
        return Some(PropertyValue::Null);
    }
    if matches!(value, CellValue::Blob(_)) {
        return None;
    }

    let Some(field_type) = field_type else {
        return Some(match value {
            CellValue::Integer(i) => PropertyValue::Number(*i as f64),
            CellValue::Real(f) => PropertyValue::Number(*f),
            CellValue::Text(s) => PropertyValue::String(s.clone()),
            CellValue::Null | CellValue::Blob(_) => return None,
        });
    };

    match field_type {
        FieldType::Boolean => match value {
            CellValue::Integer(i) => Some(PropertyValue::Bool(*i != 0)),
            CellValue::Text(s) => parse_bool(s).map(PropertyValue::Bool),
            _ => None,
        },
        FieldType::Integer | FieldType::Decimal => value.as_f64().map(PropertyValue::Number),
        FieldType::Date | FieldType::Timestamp => match value {
            CellValue::Text(s) => parse_timestamp(s).map(PropertyValue::Timestamp),
            CellValue::Integer(secs) => DateTime::from_timestamp(*secs, 0).map(PropertyValue::Timestamp),
            _ => None,
        },
        FieldType::Text | FieldType::Identifier | FieldType::Structured => match value {
            CellValue::Text(s) => Some(PropertyValue::String(s.clone())),
            CellValue::Integer(i) => Some(PropertyValue::String(i.to_string())),
            CellValue::Real(f) => Some(PropertyValue::String(f.to_string())),
            _ => None,
        },
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Some(true),
        "false" | "f" | "no" | "n" | "0" => Some(false),
        _ => None,
    }
}

/// RFC 3339, `YYYY-MM-DD HH:MM:SS[.fff]` or a bare date (midnight UTC).
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, format) {
            return Some(t.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

/// First candidate column holding a non-empty value.
pub fn label<'a>(record: &'a RowRecord, label_fields: &[String]) -> Option<(&'a str, String)> {
    label_fields.iter().find_map(|candidate| {
        record.cells.iter().find_map(|(column, value)| {
            if !column.eq_ignore_ascii_case(candidate) {
                return None;
            }
            let text = match value {
                CellValue::Text(s) if !s.trim().is_empty() => s.trim().to_string(),
                CellValue::Integer(_) | CellValue::Real(_) => value.as_key()?,
                _ => return None,
            };
            Some((column.as_str(), text))
        })
    })
}

/// Build an unscored node from one row. Rows without an identity yield `None`.
pub fn to_node(
    entity: &SemanticEntity,
    record: &RowRecord,
    key_columns: &[String],
    label_fields: &[String],
) -> Option<GraphNode> {
    let source_id = source_id(record, key_columns)?;
    let label = label(record, label_fields);
    let label_column = label.as_ref().map(|(c, _)| *c);
    let name = label
        .as_ref()
        .map(|(_, text)| text.clone())
        .unwrap_or_else(|| format!("{} {}", entity.display_name, source_id));

    let mut properties = Properties::new();
    for (column, value) in &record.cells {
        if column == ROWID_COLUMN || Some(column.as_str()) == label_column {
            continue;
        }
        let field_type = entity.field(column).map(|f| f.field_type);
        match coerce(value, field_type) {
            Some(v) => {
                properties.insert(column.clone(), v);
            }
            None => debug!(entity = %entity.name, column = %column, "Dropped unrepresentable value"),
        }
    }

    Some(GraphNode {
        id: GraphNode::node_id(&entity.name, &source_id),
        node_type: entity.name.clone(),
        name,
        properties,
        importance_score: 0.0,
        source_table: Some(entity.source_table.clone()),
        source_id: Some(source_id),
    })
}
