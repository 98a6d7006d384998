//! Clause extractor (§4.1)
//!
//! Depth-first walk of a trial document collecting every embedded `match` clause along
//! with its structural provenance. Top-level `match` keys are skipped by design (see
//! Open Question (a) in `DESIGN.md`) — the clause extractor only descends into nested
//! mappings and lists looking for a `match` key at arm/dose/step level.

use crate::document::Document;
use crate::model::{MatchClauseData, MatchClauseLevel, ParentPath};
use serde_json::Value;
use std::collections::VecDeque;

/// One item pending extraction: the accumulated path to its parent, the key under which
/// it hangs, and its value.
struct QueueItem {
    path: ParentPath,
    key: KeyOrIndex,
    value: Value,
}

enum KeyOrIndex {
    Key(String),
    Index(usize),
}

/// Walk `trial` and yield every `match` clause that survives the suspension filter.
///
/// Uses an explicit LIFO work list rather than recursion, mirroring the original
/// traversal order (a `deque.pop()` from the right) so clause discovery order is stable
/// and independent of Rust's default recursion depth limits on deeply nested curations.
pub fn extract_match_clauses(trial: &Document, match_on_closed: bool) -> Vec<MatchClauseData> {
    let protocol_no = trial
        .get("protocol_no")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut queue: VecDeque<QueueItem> = VecDeque::new();
    for (key, value) in trial {
        if key == "match" {
            // Top-level match clauses are reserved for a future "trial-level" criterion.
            continue;
        }
        queue.push_back(QueueItem {
            path: ParentPath::new(),
            key: KeyOrIndex::Key(key.clone()),
            value: value.clone(),
        });
    }

    let mut out = Vec::new();
    while let Some(item) = queue.pop_back() {
        match item.value {
            Value::Object(map) => {
                for (inner_key, inner_value) in &map {
                    if inner_key == "match" {
                        if is_suspended(&item.path, &map, match_on_closed) {
                            continue;
                        }
                        let parent_path = extend_path(&item.path, &item.key).pushed_key("match");
                        let level =
                            MatchClauseLevel::from_deepest_key(extend_path(&item.path, &item.key).deepest_key());
                        let clause = match inner_value {
                            Value::Array(items) => items.clone(),
                            other => vec![other.clone()],
                        };
                        out.push(MatchClauseData {
                            clause,
                            parent_path,
                            level,
                            ambient_attributes: map.clone(),
                            protocol_no: protocol_no.clone(),
                        });
                    } else {
                        queue.push_back(QueueItem {
                            path: extend_path(&item.path, &item.key),
                            key: KeyOrIndex::Key(inner_key.clone()),
                            value: inner_value.clone(),
                        });
                    }
                }
            }
            Value::Array(items) => {
                for (index, element) in items.into_iter().enumerate() {
                    queue.push_back(QueueItem {
                        path: extend_path(&item.path, &item.key),
                        key: KeyOrIndex::Index(index),
                        value: element,
                    });
                }
            }
            _ => {}
        }
    }
    out
}

fn extend_path(path: &ParentPath, key: &KeyOrIndex) -> ParentPath {
    match key {
        KeyOrIndex::Key(k) => path.pushed_key(k.clone()),
        KeyOrIndex::Index(i) => path.pushed_index(*i),
    }
}

/// Applies the suspension filter (§4.1 table). `path` is the path to the entity that owns
/// `owning_entity` (the object directly containing the `match` key); the deepest key on
/// that path determines which rule applies.
fn is_suspended(path: &ParentPath, owning_entity: &Document, match_on_closed: bool) -> bool {
    if match_on_closed {
        return false;
    }
    match path.deepest_key() {
        Some("arm") => flag_set(owning_entity, "arm_suspended"),
        Some("dose") => flag_set(owning_entity, "level_suspended"),
        Some("step") => {
            let arms = owning_entity.get("arm").and_then(Value::as_array);
            match arms {
                Some(arms) if !arms.is_empty() => arms.iter().all(|arm| {
                    arm.as_object()
                        .is_some_and(|arm| flag_set(arm, "arm_suspended"))
                }),
                _ => false,
            }
        }
        _ => false,
    }
}

fn flag_set(entity: &Document, field: &str) -> bool {
    entity
        .get(field)
        .and_then(Value::as_str)
        .map(|v| v.trim().eq_ignore_ascii_case("y"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trial_with_step(step: Value) -> Document {
        json!({
            "protocol_no": "NCT001",
            "treatment_list": { "step": [step] }
        })
        .as_object()
        .unwrap()
        .clone()
    }

    #[test]
    fn extracts_arm_level_clause() {
        let trial = trial_with_step(json!({
            "arm": [{
                "arm_suspended": "n",
                "match": [{"clinical": {"AGE_NUMERICAL": ">=18"}}]
            }]
        }));
        let clauses = extract_match_clauses(&trial, false);
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].level, MatchClauseLevel::Arm);
        assert_eq!(clauses[0].protocol_no, "NCT001");
    }

    #[test]
    fn skips_suspended_arm_unless_match_on_closed() {
        let trial = trial_with_step(json!({
            "arm": [{
                "arm_suspended": "Y",
                "match": [{"clinical": {"AGE_NUMERICAL": ">=18"}}]
            }]
        }));
        assert!(extract_match_clauses(&trial, false).is_empty());
        assert_eq!(extract_match_clauses(&trial, true).len(), 1);
    }

    #[test]
    fn step_suspended_when_every_arm_suspended() {
        let trial = trial_with_step(json!({
            "match": [{"clinical": {"X": 1}}],
            "arm": [
                {"arm_suspended": "y"},
                {"arm_suspended": "y"}
            ]
        }));
        assert!(extract_match_clauses(&trial, false).is_empty());
    }

    #[test]
    fn top_level_match_clause_is_always_skipped() {
        let mut trial = Document::new();
        trial.insert("protocol_no".into(), json!("NCT001"));
        trial.insert("match".into(), json!([{"clinical": {"X": 1}}]));
        assert!(extract_match_clauses(&trial, false).is_empty());
        assert!(extract_match_clauses(&trial, true).is_empty());
    }

    #[test]
    fn missing_suspension_flag_defaults_to_open() {
        let trial = trial_with_step(json!({
            "arm": [{
                "match": [{"clinical": {"X": 1}}]
            }]
        }));
        assert_eq!(extract_match_clauses(&trial, false).len(), 1);
    }
}
