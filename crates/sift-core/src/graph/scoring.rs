//! Node importance and edge weights.
//!
//! Importance blends three signals, each mapped into [0, 1] by a monotonic
//! function so that raising any one of them never lowers the score:
//!
//! ```text
//! importance = 0.3 * w / (w + 1)          configured entity weight w >= 0
//!            + 0.5 * d / (d + 5)          d = edges touching the node
//!            + 0.2 * ln(1 + m) / ln(1 + M) m = sum of |decimal fields|,
//!                                          M = largest m of the node type
//! ```

use std::collections::HashMap;

use crate::entity::{EntityRelationship, FieldType, SemanticEntity};
use super::model::GraphNode;

const WEIGHT_SHARE: f64 = 0.3;
const DEGREE_SHARE: f64 = 0.5;
const MAGNITUDE_SHARE: f64 = 0.2;
/// Degree at which the connectivity term reaches half its share.
const DEGREE_HALF: f64 = 5.0;

/// Sum of absolute values of the node's decimal fields.
pub fn magnitude(node: &GraphNode, entity: &SemanticEntity) -> f64 {
    entity
        .fields
        .iter()
        .filter(|f| f.field_type == FieldType::Decimal)
        .filter_map(|f| node.properties.get(&f.name).and_then(|v| v.as_f64()))
        .filter(|v| v.is_finite())
        .map(f64::abs)
        .sum()
}

/// Importance in [0, 1].
pub fn importance(weight: f64, degree: usize, magnitude: f64, max_magnitude: f64) -> f64 {
    let weight = if weight.is_finite() { weight.max(0.0) } else { 0.0 };
    let weight_term = weight / (weight + 1.0);

    let degree = degree as f64;
    let degree_term = degree / (degree + DEGREE_HALF);

    let magnitude_term = if max_magnitude > 0.0 && magnitude > 0.0 {
        ((1.0 + magnitude).ln() / (1.0 + max_magnitude).ln()).min(1.0)
    } else {
        0.0
    };

    (WEIGHT_SHARE * weight_term + DEGREE_SHARE * degree_term + MAGNITUDE_SHARE * magnitude_term).clamp(0.0, 1.0)
}

/// Edge weight: the relationship's own weight, else the configured multiplier
/// for its kind, else 1. Never negative.
pub fn edge_weight(relationship: &EntityRelationship, multipliers: &HashMap<String, f64>) -> f64 {
    let weight = relationship
        .weight
        .or_else(|| multipliers.get(&relationship.kind).copied())
        .unwrap_or(1.0);
    if weight.is_finite() {
        weight.max(0.0)
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_importance_bounds() {
        assert_eq!(importance(0.0, 0, 0.0, 0.0), 0.0);
        let max = importance(f64::MAX, usize::MAX, 1e300, 1e300);
        assert!(max <= 1.0 && max > 0.99);
        assert_eq!(importance(-3.0, 0, 0.0, 0.0), 0.0);
        assert_eq!(importance(f64::NAN, 0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_importance_is_monotonic_in_each_signal() {
        let base = importance(1.0, 2, 100.0, 1000.0);
        assert!(importance(2.0, 2, 100.0, 1000.0) > base);
        assert!(importance(1.0, 3, 100.0, 1000.0) > base);
        assert!(importance(1.0, 2, 500.0, 1000.0) > base);
        assert_eq!(importance(1.0, 2, 1000.0, 1000.0), 0.3 * 0.5 + 0.5 * (2.0 / 7.0) + 0.2);
    }

    #[test]
    fn test_edge_weight_precedence() {
        let multipliers = HashMap::from([("HAS_MANY".to_string(), 2.0), ("NEG".to_string(), -1.0)]);
        let rel = |kind: &str, weight: Option<f64>| EntityRelationship {
            target: "x".into(),
            kind: kind.into(),
            weight,
        };
        assert_eq!(edge_weight(&rel("HAS_MANY", Some(0.5)), &multipliers), 0.5);
        assert_eq!(edge_weight(&rel("HAS_MANY", None), &multipliers), 2.0);
        assert_eq!(edge_weight(&rel("OTHER", None), &multipliers), 1.0);
        assert_eq!(edge_weight(&rel("NEG", None), &multipliers), 0.0);
    }
}
