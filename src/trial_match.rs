//! Trial-match shaping (§4.10)
//!
//! `RawQueryResult` is the executor's raw output: one clinical document paired with the
//! genomic documents that survived intersection for a single path. `TrialMatch` wraps it
//! with the provenance (trial, clause, path) needed to flatten it into zero or more
//! persistable documents, which `flatten_trial_match` does without any I/O.

use crate::document::{Document, DocumentId};
use crate::model::MatchClauseData;
use crate::query::{MultiCollectionQuery, QueryFragment};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// One clinical document and the genomic documents that survived narrowing for a single
/// executed path (§4.6 step 5).
#[derive(Debug, Clone)]
pub struct RawQueryResult {
    pub source_query: Vec<MultiCollectionQuery>,
    pub clinical_id: DocumentId,
    pub clinical_doc: Document,
    pub genomic_docs: Vec<Document>,
}

/// A raw result plus the provenance needed to shape it into persistable documents.
#[derive(Debug, Clone)]
pub struct TrialMatch {
    pub trial: Document,
    pub clause_data: MatchClauseData,
    pub raw_query_result: RawQueryResult,
}

const TRIAL_BOOKKEEPING_KEYS: &[&str] = &["treatment_list", "status", "_id"];

/// Trial fields with structural bookkeeping keys removed, per §4.10.
fn filtered_trial(trial: &Document) -> Document {
    trial
        .iter()
        .filter(|(k, _)| !TRIAL_BOOKKEEPING_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Extracts the genomic-query fragment that matched `genomic_doc`'s criteria, with the
/// join field (which only exists to link back to the clinical document) stripped out.
/// `None` when the match carried no genomic documents at all.
fn genomic_details(genomic_doc: Option<&Document>, genomic_fragment: Option<&QueryFragment>) -> Document {
    let mut out = Document::new();
    if let Some(doc) = genomic_doc {
        for (k, v) in doc {
            out.insert(k.clone(), v.clone());
        }
    }
    if let Some(fragment) = genomic_fragment {
        for (k, v) in fragment {
            if k == "CLINICAL_ID" {
                continue;
            }
            out.insert(k.clone(), v.clone());
        }
    }
    out
}

/// All genomic query fragments carried by `queries`, each with the join field present so
/// callers can still see which fragment they came from before stripping it.
fn genomic_fragments(queries: &[MultiCollectionQuery]) -> Vec<QueryFragment> {
    queries
        .iter()
        .flat_map(|q| q.fragments("genomic"))
        .cloned()
        .collect()
}

/// Serializes `doc` with sorted keys and hashes the result, giving a stable content hash
/// independent of field insertion order.
fn content_hash(doc: &Document) -> String {
    let sorted: std::collections::BTreeMap<String, Value> =
        doc.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    let bytes = serde_json::to_vec(&sorted).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    format!("{digest:x}")
}

/// Flattens a [`TrialMatch`] into one persistable document per genomic document it
/// carries (each paired with the genomic fragment that produced it), or exactly one when
/// it carried none (§4.10). Pure: performs no I/O.
#[must_use]
pub fn flatten_trial_match(trial_match: &TrialMatch) -> Vec<Document> {
    let trial = filtered_trial(&trial_match.trial);
    let query_value = query_to_value(&trial_match.raw_query_result.source_query);
    let genomic_docs = &trial_match.raw_query_result.genomic_docs;

    let build = |genomic_doc: Option<&Document>, fragment: Option<&QueryFragment>| -> Document {
        let mut out = Document::new();
        for (k, v) in &trial_match.raw_query_result.clinical_doc {
            out.insert(k.clone(), v.clone());
        }
        for (k, v) in genomic_details(genomic_doc, fragment) {
            out.insert(k, v);
        }
        for (k, v) in &trial_match.clause_data.ambient_attributes {
            out.insert(k.clone(), v.clone());
        }
        for (k, v) in &trial {
            out.insert(k.clone(), v.clone());
        }
        out.insert("query".to_string(), query_value.clone());
        let hash = content_hash(&out);
        out.insert("hash".to_string(), Value::String(hash));
        out
    };

    if genomic_docs.is_empty() {
        vec![build(None, None)]
    } else {
        let fragments = genomic_fragments(&trial_match.raw_query_result.source_query);
        genomic_docs
            .iter()
            .map(|doc| {
                let fragment = fragments.iter().find(|f| fragment_matches_doc(f, doc));
                build(Some(doc), fragment)
            })
            .collect()
    }
}

/// A genomic fragment "matches" a genomic document for shaping purposes when every
/// non-join field it names equals the document's value for that key. Best-effort: falls
/// back to the first fragment (or none) when nothing matches exactly, since shaping must
/// never fail — only the persisted `query` provenance is affected, not correctness of the
/// match itself.
fn fragment_matches_doc(fragment: &QueryFragment, doc: &Document) -> bool {
    fragment.iter().all(|(k, v)| {
        if k == "CLINICAL_ID" {
            return true;
        }
        match doc.get(k) {
            Some(actual) => values_overlap(actual, v),
            None => false,
        }
    })
}

fn values_overlap(actual: &Value, constraint: &Value) -> bool {
    if let Some(obj) = constraint.as_object() {
        if let Some(Value::Array(items)) = obj.get("IN") {
            return items.iter().any(|i| i == actual);
        }
    }
    actual == constraint
}

fn query_to_value(queries: &[MultiCollectionQuery]) -> Value {
    serde_json::to_value(
        queries
            .iter()
            .map(|q| {
                q.collections()
                    .map(|c| {
                        let fragments = q
                            .fragments(c)
                            .iter()
                            .map(|f| Value::Object(f.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
                            .collect();
                        (c.to_string(), Value::Array(fragments))
                    })
                    .collect::<serde_json::Map<String, Value>>()
            })
            .collect::<Vec<_>>(),
    )
    .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MatchClauseLevel, ParentPath};
    use serde_json::json;

    fn clause_data(ambient: Document) -> MatchClauseData {
        MatchClauseData {
            clause: vec![],
            parent_path: ParentPath::new(),
            level: MatchClauseLevel::Arm,
            ambient_attributes: ambient,
            protocol_no: "NCT001".to_string(),
        }
    }

    fn clinical_doc() -> Document {
        let mut d = Document::new();
        d.insert("_id".to_string(), json!("c1"));
        d.insert("VITAL_STATUS".to_string(), json!("alive"));
        d
    }

    fn trial_doc() -> Document {
        let mut t = Document::new();
        t.insert("protocol_no".to_string(), json!("NCT001"));
        t.insert("status".to_string(), json!("open"));
        t.insert("treatment_list".to_string(), json!({"step": []}));
        t.insert("_id".to_string(), json!("trial-internal-id"));
        t
    }

    #[test]
    fn clinical_only_match_yields_one_document_without_genomic_fields() {
        let raw = RawQueryResult {
            source_query: vec![],
            clinical_id: DocumentId::from("c1"),
            clinical_doc: clinical_doc(),
            genomic_docs: vec![],
        };
        let trial_match = TrialMatch {
            trial: trial_doc(),
            clause_data: clause_data(Document::new()),
            raw_query_result: raw,
        };
        let flattened = flatten_trial_match(&trial_match);
        assert_eq!(flattened.len(), 1);
        assert_eq!(flattened[0].get("protocol_no"), Some(&json!("NCT001")));
        assert!(!flattened[0].contains_key("status"));
        assert!(!flattened[0].contains_key("treatment_list"));
        assert!(flattened[0].contains_key("hash"));
    }

    #[test]
    fn one_document_emitted_per_genomic_doc() {
        let mut genomic_one = Document::new();
        genomic_one.insert("_id".to_string(), json!("g1"));
        genomic_one.insert("HUGO_SYMBOL".to_string(), json!("BRAF"));
        let mut genomic_two = Document::new();
        genomic_two.insert("_id".to_string(), json!("g2"));
        genomic_two.insert("HUGO_SYMBOL".to_string(), json!("BRAF"));

        let mut fragment = crate::query::QueryFragment::new();
        fragment.insert("CLINICAL_ID".to_string(), json!({"IN": ["c1"]}));
        fragment.insert("HUGO_SYMBOL".to_string(), json!("BRAF"));
        let mut query = MultiCollectionQuery::new();
        query.push_fragment("genomic", fragment);

        let raw = RawQueryResult {
            source_query: vec![query],
            clinical_id: DocumentId::from("c1"),
            clinical_doc: clinical_doc(),
            genomic_docs: vec![genomic_one, genomic_two],
        };
        let trial_match = TrialMatch {
            trial: trial_doc(),
            clause_data: clause_data(Document::new()),
            raw_query_result: raw,
        };
        let flattened = flatten_trial_match(&trial_match);
        assert_eq!(flattened.len(), 2);
        for doc in &flattened {
            assert_eq!(doc.get("HUGO_SYMBOL"), Some(&json!("BRAF")));
            assert!(!doc.contains_key("CLINICAL_ID"));
        }
    }

    #[test]
    fn hash_is_stable_across_field_insertion_order() {
        let raw = RawQueryResult {
            source_query: vec![],
            clinical_id: DocumentId::from("c1"),
            clinical_doc: clinical_doc(),
            genomic_docs: vec![],
        };
        let trial_match = TrialMatch {
            trial: trial_doc(),
            clause_data: clause_data(Document::new()),
            raw_query_result: raw,
        };
        let first = flatten_trial_match(&trial_match);
        let second = flatten_trial_match(&trial_match);
        assert_eq!(first[0].get("hash"), second[0].get("hash"));
    }

    #[test]
    fn ambient_attributes_are_merged_into_output() {
        let mut ambient = Document::new();
        ambient.insert("ARM_NAME".to_string(), json!("Arm A"));
        let raw = RawQueryResult {
            source_query: vec![],
            clinical_id: DocumentId::from("c1"),
            clinical_doc: clinical_doc(),
            genomic_docs: vec![],
        };
        let trial_match = TrialMatch {
            trial: trial_doc(),
            clause_data: clause_data(ambient),
            raw_query_result: raw,
        };
        let flattened = flatten_trial_match(&trial_match);
        assert_eq!(flattened[0].get("ARM_NAME"), Some(&json!("Arm A")));
    }
}
