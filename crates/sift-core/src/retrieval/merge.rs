//! Result merging.

use std::collections::HashMap;

use super::model::SearchResult;

/// Merge result sets by id, keeping the highest-scoring copy of each.
///
/// Output is sorted by score, highest first. Equal scores keep the order in
/// which ids were first seen.
pub fn merge_max<I>(sets: I) -> Vec<SearchResult>
where
    I: IntoIterator<Item = Vec<SearchResult>>,
{
    let mut merged: Vec<SearchResult> = Vec::new();
    let mut position: HashMap<String, usize> = HashMap::new();

    for set in sets {
        for mut result in set {
            result.score = clamp_score(result.score);
            match position.get(&result.id) {
                Some(&idx) => {
                    if result.score > merged[idx].score {
                        merged[idx] = result;
                    }
                }
                None => {
                    position.insert(result.id.clone(), merged.len());
                    merged.push(result);
                }
            }
        }
    }

    merged.sort_by(|a, b| b.score.total_cmp(&a.score));
    merged
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}
