//! Document value model
//!
//! Trial curations, clinical documents, and genomic documents are all instances of a
//! single open, recursive value type rather than fixed Rust structs — the curation schema
//! is configurable and only partially known to this crate. Document identifiers are kept
//! opaque so the cache and id-injection code never assume a specific driver's id
//! representation (ObjectId, UUID, plain integer, ...).

use serde_json::Value;
use std::fmt;

/// A document is a JSON object. Using `serde_json::Map` directly (rather than a typed
/// struct) lets trial curations, clinical records, and genomic records share one
/// representation even though only a handful of their keys are meaningful to this crate.
pub type Document = serde_json::Map<String, Value>;

/// An opaque document identifier.
///
/// Document stores differ on whether `_id` is a string (UUID, ObjectId hex), an integer
/// surrogate key, or something else entirely. Keeping two variants (rather than committing
/// to `String`) means the cache and `$in`-style fragments can round-trip whatever the
/// database handle returns without this crate ever parsing or reformatting it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentId {
    Str(String),
    Int(i64),
}

impl DocumentId {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DocumentId::Str(s) => Some(s),
            DocumentId::Int(_) => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DocumentId::Int(i) => Some(*i),
            DocumentId::Str(_) => None,
        }
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Str(s) => write!(f, "{s}"),
            DocumentId::Int(i) => write!(f, "{i}"),
        }
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        DocumentId::Str(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        DocumentId::Str(s.to_string())
    }
}

impl From<i64> for DocumentId {
    fn from(i: i64) -> Self {
        DocumentId::Int(i)
    }
}

impl From<DocumentId> for Value {
    fn from(id: DocumentId) -> Self {
        match id {
            DocumentId::Str(s) => Value::String(s),
            DocumentId::Int(i) => Value::Number(i.into()),
        }
    }
}

/// Best-effort extraction of a [`DocumentId`] from a raw JSON value, as returned in an
/// `_id` or join-field position of a document fetched from the database.
#[must_use]
pub fn document_id_from_value(value: &Value) -> Option<DocumentId> {
    match value {
        Value::String(s) => Some(DocumentId::Str(s.clone())),
        Value::Number(n) => n.as_i64().map(DocumentId::Int),
        _ => None,
    }
}

/// Merges a fixed minimum field list with extra configured fields, preserving the
/// minimum's order and skipping duplicates already present in it. Shared by the trial,
/// clinical, and genomic projection builders so the "minimum plus configured extras"
/// rule (§4.6, §4.9) is expressed once.
#[must_use]
pub fn merge_projection(minimum: &[&str], extra: &[String]) -> Vec<String> {
    let mut fields: Vec<String> = minimum.iter().map(|s| (*s).to_string()).collect();
    for field in extra {
        if !fields.contains(field) {
            fields.push(field.clone());
        }
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_inner_value() {
        assert_eq!(DocumentId::from("abc").to_string(), "abc");
        assert_eq!(DocumentId::from(42_i64).to_string(), "42");
    }

    #[test]
    fn ordering_is_derived_str_before_int_variant() {
        let a = DocumentId::from("abc");
        let b = DocumentId::from("abd");
        assert!(a < b);
    }

    #[test]
    fn merge_projection_dedups_against_the_minimum() {
        let merged = merge_projection(&["_id", "SAMPLE_ID"], &["SAMPLE_ID".to_string(), "MRN".to_string()]);
        assert_eq!(merged, vec!["_id", "SAMPLE_ID", "MRN"]);
    }

    #[test]
    fn extraction_from_json_handles_both_shapes() {
        assert_eq!(
            document_id_from_value(&Value::String("x".into())),
            Some(DocumentId::from("x"))
        );
        assert_eq!(
            document_id_from_value(&serde_json::json!(7)),
            Some(DocumentId::from(7_i64))
        );
        assert_eq!(document_id_from_value(&Value::Null), None);
    }
}
