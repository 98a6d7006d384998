//! Criterion/collection tagged types
//!
//! A curation leaf names one of exactly two target collections and carries a flat map of
//! curation keys to curation values. Kept as its own small module (rather than folded into
//! `tree.rs`) because both the tree builder and the path enumerator need to move these
//! around without caring about tree structure.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The two collections a leaf criterion can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Clinical,
    Genomic,
}

impl Collection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Clinical => "clinical",
            Collection::Genomic => "genomic",
        }
    }

    /// Parse the curation's leaf key (`"clinical"` / `"genomic"`) into a `Collection`.
    /// Curation authors use lowercase keys; this is matched exactly, not
    /// case-insensitively, since it names a structural keyword rather than a trial value.
    #[must_use]
    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "clinical" => Some(Collection::Clinical),
            "genomic" => Some(Collection::Genomic),
            _ => None,
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One leaf of a match clause: a target collection plus its field map, exactly as
/// authored in the curation (keys not yet uppercased or resolved against a mapping).
#[derive(Debug, Clone, PartialEq)]
pub struct LeafCriterion {
    pub collection: Collection,
    pub fields: BTreeMap<String, Value>,
}

impl LeafCriterion {
    #[must_use]
    pub fn new(collection: Collection, fields: BTreeMap<String, Value>) -> Self {
        LeafCriterion { collection, fields }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_recognizes_only_the_two_structural_keywords() {
        assert_eq!(Collection::parse("clinical"), Some(Collection::Clinical));
        assert_eq!(Collection::parse("genomic"), Some(Collection::Genomic));
        assert_eq!(Collection::parse("and"), None);
        assert_eq!(Collection::parse("Clinical"), None);
    }

    #[test]
    fn display_round_trips_through_parse() {
        for c in [Collection::Clinical, Collection::Genomic] {
            assert_eq!(Collection::parse(&c.to_string()), Some(c));
        }
    }
}
