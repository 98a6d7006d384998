//! Multi-collection query value (§3 `MultiCollectionQuery`)
//!
//! A mapping from collection name to a list of AND-combined query fragments. In the
//! concrete schema exactly two collections exist (`clinical`, `genomic`), but the map is
//! kept open on collection name rather than a two-field struct so the translator and
//! executor don't need to special-case either one.

use serde_json::Value;
use std::collections::BTreeMap;

/// One AND-combined fragment: a flat map of sample-schema field name to constraint value
/// (an equality value or an operator map like `{"$in": [...]}`, left opaque to this crate).
pub type QueryFragment = BTreeMap<String, Value>;

#[derive(Debug, Clone, Default)]
pub struct MultiCollectionQuery {
    fragments: BTreeMap<String, Vec<QueryFragment>>,
}

impl MultiCollectionQuery {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.values().all(Vec::is_empty)
    }

    pub fn push_fragment(&mut self, collection: &str, fragment: QueryFragment) {
        if fragment.is_empty() {
            return;
        }
        self.fragments
            .entry(collection.to_string())
            .or_default()
            .push(fragment);
    }

    #[must_use]
    pub fn fragments(&self, collection: &str) -> &[QueryFragment] {
        self.fragments
            .get(collection)
            .map_or(&[], |fragments| fragments.as_slice())
    }

    pub fn fragments_mut(&mut self, collection: &str) -> &mut Vec<QueryFragment> {
        self.fragments.entry(collection.to_string()).or_default()
    }

    #[must_use]
    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }
}
