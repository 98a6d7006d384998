//! Query translator + id injection (§4.4, §4.5)

use crate::criteria::Collection;
use crate::document::DocumentId;
use crate::error::MatchEngineError;
use crate::handlers::{HandlerArgs, HandlerRegistry};
use crate::model::MatchClauseData;
use crate::path::MatchPath;
use crate::query::{MultiCollectionQuery, QueryFragment};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One entry of `trial_key_mappings[collection][UPPERCASE_KEY]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMapping {
    #[serde(default = "default_sample_value")]
    pub sample_value: String,
    #[serde(default)]
    pub ignore: bool,
    /// Handler-specific options beyond `sample_value`/`ignore` (e.g. a vocabulary table).
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
}

fn default_sample_value() -> String {
    "nomap".to_string()
}

impl Default for KeyMapping {
    fn default() -> Self {
        KeyMapping {
            sample_value: default_sample_value(),
            ignore: false,
            options: BTreeMap::new(),
        }
    }
}

/// `collection_mappings[collection]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionMapping {
    pub join_field: String,
}

/// Everything the translator needs: the key dictionary, the join-field dictionary, the
/// primary unique field name, and the handler registry.
pub struct TransformerContext {
    pub trial_key_mappings: BTreeMap<String, BTreeMap<String, KeyMapping>>,
    pub collection_mappings: BTreeMap<String, CollectionMapping>,
    pub primary_collection_unique_field: String,
    pub handlers: HandlerRegistry,
    /// Extra clinical projection fields beyond the §4.6 minimum, configured per trial.
    pub clinical_projection: Vec<String>,
    /// Extra genomic projection fields beyond the §4.6 minimum.
    pub genomic_projection: Vec<String>,
    /// Extra trial projection fields beyond `protocol_no`/`nct_id`/`status`/`treatment_list`.
    pub trial_projection: Vec<String>,
}

impl TransformerContext {
    #[must_use]
    pub fn join_field_for(&self, collection: Collection) -> Option<&str> {
        self.join_field(collection)
    }
}

impl TransformerContext {
    fn mapping_for(&self, collection: Collection, trial_key: &str) -> KeyMapping {
        self.trial_key_mappings
            .get(collection.as_str())
            .and_then(|m| m.get(&trial_key.to_uppercase()))
            .cloned()
            .unwrap_or_default()
    }

    fn join_field(&self, collection: Collection) -> Option<&str> {
        self.collection_mappings
            .get(collection.as_str())
            .map(|m| m.join_field.as_str())
    }
}

/// Translate one [`MatchPath`] into a list of [`MultiCollectionQuery`], one per node of
/// the path. Ties between two criteria mapping to the same sample-schema key within one
/// node resolve last-write-wins (Open Question (d) — see `DESIGN.md`): this function
/// inserts into an ordinary `BTreeMap`, so a later criterion silently overwrites an
/// earlier one's value for the same key.
pub fn translate_path(
    clause_data: &MatchClauseData,
    path: &MatchPath,
    ctx: &TransformerContext,
) -> Result<Vec<MultiCollectionQuery>, MatchEngineError> {
    let mut output = Vec::new();
    for node in path.nodes() {
        let mut query = MultiCollectionQuery::new();
        for criterion in node {
            let mut and_query: QueryFragment = QueryFragment::new();
            for (trial_key, trial_value) in &criterion.fields {
                let mapping = ctx.mapping_for(criterion.collection, trial_key);
                if mapping.ignore {
                    continue;
                }
                let handler = ctx.handlers.get(&mapping.sample_value).ok_or_else(|| {
                    MatchEngineError::UnmappedHandler {
                        handler_name: mapping.sample_value.clone(),
                        trial_key: trial_key.clone(),
                        collection: criterion.collection.as_str().to_string(),
                    }
                })?;
                let args = HandlerArgs {
                    sample_key: trial_key.to_uppercase(),
                    trial_value,
                    parent_path: &clause_data.parent_path,
                    trial_path: criterion.collection,
                    trial_key,
                    options: &mapping.options,
                };
                and_query.extend(handler(&args));
            }
            query.push_fragment(criterion.collection.as_str(), and_query);
        }
        if !query.is_empty() {
            output.push(query);
        }
    }
    Ok(output)
}

/// Grafts the candidate clinical-id set onto every query in `queries` (§4.5).
///
/// `id_list = None` disables injection (the candidate set is the entire clinical
/// collection). `id_list = Some(&[])` is left to the caller to short-circuit before
/// invoking this function — injection itself does not special-case emptiness.
///
/// Running this twice with the same `id_list` is idempotent: both the clinical
/// `{field: {IN: ids}}` fragment and each genomic fragment's join-field constraint are
/// inserted under a fixed key, so a second call only overwrites the same key with the same
/// value (last-write-wins, per Open Question (d)).
pub fn inject_ids(queries: &mut [MultiCollectionQuery], id_list: Option<&[DocumentId]>, ctx: &TransformerContext) {
    let Some(ids) = id_list else {
        return;
    };
    let ids_value: Vec<Value> = ids.iter().cloned().map(Value::from).collect();
    for query in queries.iter_mut() {
        let mut clinical_fragment = QueryFragment::new();
        clinical_fragment.insert(
            ctx.primary_collection_unique_field.clone(),
            in_fragment(&ids_value),
        );
        query.push_fragment("clinical", clinical_fragment);

        if let Some(join_field) = ctx.join_field(Collection::Genomic) {
            for fragment in query.fragments_mut("genomic") {
                fragment.insert(join_field.to_string(), in_fragment(&ids_value));
            }
        }
    }
}

fn in_fragment(ids: &[Value]) -> Value {
    let mut m = serde_json::Map::new();
    m.insert("IN".to_string(), Value::Array(ids.to_vec()));
    Value::Object(m)
}
