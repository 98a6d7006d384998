//! Database trait + in-memory fake (§6 database contract)
//!
//! The core is generic over a document-store driver; it only ever consumes this trait.
//! No networked driver (mongodb, bson, ...) is shipped or fabricated — just the contract
//! and an in-memory implementation used by tests and by `--dry-run`-adjacent tooling.

use crate::document::{Document, DocumentId};
use crate::query::QueryFragment;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum DbError {
    #[error("transient database error: {0}")]
    Transient(String),
    #[error("fatal database error: {0}")]
    Fatal(String),
}

/// The document-store contract the core consumes. Two collections exist in the concrete
/// schema (`clinical`, `genomic`); `find`/`find_by_ids` are generic over collection name so
/// callers don't need two near-identical trait methods.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute an AND-combined filter against `collection`, returning documents shaped by
    /// `projection` (an empty projection means "all fields").
    async fn find(
        &self,
        collection: &str,
        and_fragments: &[QueryFragment],
        projection: &[String],
    ) -> Result<Vec<Document>, DbError>;

    /// Bulk fetch by id — the hydration step's `{_id: {IN: [...]}}` lookup.
    async fn find_by_ids(
        &self,
        collection: &str,
        ids: &[DocumentId],
        projection: &[String],
    ) -> Result<Vec<Document>, DbError>;

    /// Fetch trials, optionally restricted to `protocol_nos`, projected to `projection`.
    async fn find_trials(
        &self,
        protocol_nos: Option<&[String]>,
        projection: &[String],
    ) -> Result<Vec<Document>, DbError>;

    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>, DbError>;

    async fn create_index(&self, collection: &str, fields: &[String]) -> Result<(), DbError>;
}

/// Applies a projection to a document; empty projection passes the document through
/// unchanged. `_id` is always retained regardless of projection, matching the minimum
/// projection contracts in §4.6 which always list it.
fn project(doc: &Document, projection: &[String]) -> Document {
    if projection.is_empty() {
        return doc.clone();
    }
    let mut out = Document::new();
    for field in projection {
        if let Some(value) = doc.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    if let Some(id) = doc.get("_id") {
        out.insert("_id".to_string(), id.clone());
    }
    out
}

fn fragment_matches(doc: &Document, fragment: &QueryFragment) -> bool {
    fragment.iter().all(|(field, constraint)| {
        let Some(actual) = doc.get(field) else {
            return false;
        };
        match constraint.as_object() {
            Some(op_map) if op_map.contains_key("IN") => op_map["IN"]
                .as_array()
                .is_some_and(|values| values.contains(actual)),
            Some(_) => true,
            None => actual == constraint,
        }
    })
}

fn and_matches(doc: &Document, and_fragments: &[QueryFragment]) -> bool {
    and_fragments.iter().all(|fragment| fragment_matches(doc, fragment))
}

fn doc_id(doc: &Document) -> Option<DocumentId> {
    doc.get("_id").and_then(crate::document::document_id_from_value)
}

/// In-memory test fake backing `Database`. Cheaply cloneable (each field is an `Arc`) so
/// the worker pool can hand every worker its own handle while all handles observe the
/// same fixture data, matching the "one database handle per worker, shared cache"
/// concurrency model (§5).
#[derive(Clone)]
pub struct InMemoryDatabase {
    clinical: Arc<Vec<Document>>,
    genomic: Arc<Vec<Document>>,
    trials: Arc<Vec<Document>>,
    indexes: Arc<std::sync::Mutex<std::collections::HashMap<String, HashSet<String>>>>,
}

impl InMemoryDatabase {
    #[must_use]
    pub fn new(clinical: Vec<Document>, genomic: Vec<Document>, trials: Vec<Document>) -> Self {
        InMemoryDatabase {
            clinical: Arc::new(clinical),
            genomic: Arc::new(genomic),
            trials: Arc::new(trials),
            indexes: Arc::new(std::sync::Mutex::new(std::collections::HashMap::new())),
        }
    }

    fn collection(&self, name: &str) -> &[Document] {
        match name {
            "clinical" => &self.clinical,
            "genomic" => &self.genomic,
            _ => &[],
        }
    }
}

#[async_trait]
impl Database for InMemoryDatabase {
    async fn find(
        &self,
        collection: &str,
        and_fragments: &[QueryFragment],
        projection: &[String],
    ) -> Result<Vec<Document>, DbError> {
        Ok(self
            .collection(collection)
            .iter()
            .filter(|doc| and_matches(doc, and_fragments))
            .map(|doc| project(doc, projection))
            .collect())
    }

    async fn find_by_ids(
        &self,
        collection: &str,
        ids: &[DocumentId],
        projection: &[String],
    ) -> Result<Vec<Document>, DbError> {
        let wanted: HashSet<&DocumentId> = ids.iter().collect();
        Ok(self
            .collection(collection)
            .iter()
            .filter(|doc| doc_id(doc).is_some_and(|id| wanted.contains(&id)))
            .map(|doc| project(doc, projection))
            .collect())
    }

    async fn find_trials(
        &self,
        protocol_nos: Option<&[String]>,
        projection: &[String],
    ) -> Result<Vec<Document>, DbError> {
        Ok(self
            .trials
            .iter()
            .filter(|trial| {
                protocol_nos.is_none_or(|allowed| {
                    trial
                        .get("protocol_no")
                        .and_then(Value::as_str)
                        .is_some_and(|p| allowed.iter().any(|a| a == p))
                })
            })
            .map(|doc| project(doc, projection))
            .collect())
    }

    async fn list_indexes(&self, collection: &str) -> Result<Vec<String>, DbError> {
        Ok(self
            .indexes
            .lock()
            .unwrap()
            .get(collection)
            .map(|fields| fields.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn create_index(&self, collection: &str, fields: &[String]) -> Result<(), DbError> {
        let mut indexes = self.indexes.lock().unwrap();
        indexes
            .entry(collection.to_string())
            .or_default()
            .extend(fields.iter().cloned());
        Ok(())
    }
}
