//! Trial/clause domain types
//!
//! These types sit between the clause extractor and the tree builder: a `MatchClauseData`
//! is what extraction produces, and it is the unit the tree builder, translator, and
//! trial-match shaper all thread through unchanged.

use crate::document::Document;
use serde_json::Value;
use std::fmt;

/// One step of a [`ParentPath`]: either the key that was descended into, or the index of
/// a list element that was descended into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(k) => write!(f, "{k}"),
            PathSegment::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Records the structural ancestors of a `match` clause inside its owning trial, as an
/// ordered sequence of alternating key names and list indices. Immutable once built: the
/// clause extractor only ever appends to it while descending, never mutates in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParentPath(Vec<PathSegment>);

impl ParentPath {
    #[must_use]
    pub fn new() -> Self {
        ParentPath(Vec::new())
    }

    #[must_use]
    pub fn pushed_key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Key(key.into()));
        ParentPath(segments)
    }

    #[must_use]
    pub fn pushed_index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(PathSegment::Index(index));
        ParentPath(segments)
    }

    #[must_use]
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    /// The deepest ancestor key that is not a list index — this is how `level` (§4.1) is
    /// computed: `step`/`arm`/`dose` are always object keys, never indices, so walking
    /// back from the tail to the first `Key` segment finds the level name.
    #[must_use]
    pub fn deepest_key(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|segment| match segment {
            PathSegment::Key(k) => Some(k.as_str()),
            PathSegment::Index(_) => None,
        })
    }
}

impl fmt::Display for ParentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                if matches!(segment, PathSegment::Key(_)) {
                    write!(f, ".")?;
                }
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// The nesting level at which a `match` clause was found, derived from
/// [`ParentPath::deepest_key`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchClauseLevel {
    Step,
    Arm,
    Dose,
    /// A `match` clause found directly under the trial root. Currently always skipped by
    /// the extractor (see `clause.rs`); kept as a variant so a future extractor change
    /// does not need a new type.
    TopLevel,
}

impl MatchClauseLevel {
    #[must_use]
    pub fn from_deepest_key(key: Option<&str>) -> Self {
        match key {
            Some("step") => MatchClauseLevel::Step,
            Some("arm") => MatchClauseLevel::Arm,
            Some("dose") => MatchClauseLevel::Dose,
            _ => MatchClauseLevel::TopLevel,
        }
    }
}

/// One extracted `match` clause together with its structural provenance.
///
/// `ambient_attributes` are the sibling fields of the clause at the level it was found
/// (arm code, dose level label, ...) that get stamped onto every match emitted from this
/// clause. `protocol_no` is carried directly here (rather than requiring callers to
/// re-walk the owning trial) since every downstream consumer needs it to label a match.
#[derive(Debug, Clone)]
pub struct MatchClauseData {
    pub clause: Vec<Value>,
    pub parent_path: ParentPath,
    pub level: MatchClauseLevel,
    pub ambient_attributes: Document,
    pub protocol_no: String,
}
