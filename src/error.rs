//! Error taxonomy
//!
//! One closed enum covering every failure kind this crate raises, each carrying enough
//! context to name the offending key/collection/trial, plus an optional source error so
//! callers can match on kind while still getting the full causal chain in logs. Fatal vs.
//! recoverable is a property of the kind itself (see call sites in `pool.rs`/`engine.rs`),
//! not of where the error happens to surface.

use crate::db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatchEngineError {
    /// A configuration document was missing a required mapping entry, or a mapping entry
    /// was ill-typed. Fatal at startup.
    #[error("invalid configuration: {reason}")]
    ConfigInvalid {
        reason: String,
        #[source]
        source: Option<figment::Error>,
    },

    /// `sample_value` in a key mapping names a handler that is not registered. Fatal for
    /// the owning trial; remaining paths of that trial are skipped.
    #[error("no handler registered for `{handler_name}` (trial key `{trial_key}`, collection `{collection}`)")]
    UnmappedHandler {
        handler_name: String,
        trial_key: String,
        collection: String,
    },

    /// A transient database failure (network blip, timeout). The task is retried once
    /// before escalating.
    #[error("transient database error during `{operation}`")]
    DbTransient {
        operation: String,
        #[source]
        source: DbError,
    },

    /// A non-recoverable database failure (auth, permission, missing collection). Fatal.
    #[error("fatal database error during `{operation}`")]
    DbFatal {
        operation: String,
        #[source]
        source: DbError,
    },

    /// A trial curation had an unexpected structural shape (e.g. a `match` value that is
    /// not a list at arm level). The offending clause is logged and skipped; extraction
    /// continues with the next clause.
    #[error("malformed curation in trial `{protocol_no}` at `{location}`: {reason}")]
    CurationMalformed {
        protocol_no: String,
        location: String,
        reason: String,
    },

    /// The run was cancelled externally (user abort, prior fatal error in a sibling
    /// task). Outstanding work drains without emitting partial results.
    #[error("matching run cancelled")]
    Cancelled,
}

impl From<figment::Error> for MatchEngineError {
    fn from(source: figment::Error) -> Self {
        MatchEngineError::ConfigInvalid {
            reason: source.to_string(),
            source: Some(source),
        }
    }
}

impl MatchEngineError {
    /// Classifies a raw [`DbError`] against the `operation` that produced it, matching
    /// transient failures to `DbTransient` (retryable, §7) and everything else to
    /// `DbFatal`.
    #[must_use]
    pub fn from_db(operation: impl Into<String>, source: DbError) -> Self {
        let operation = operation.into();
        match source {
            DbError::Transient(_) => MatchEngineError::DbTransient { operation, source },
            DbError::Fatal(_) => MatchEngineError::DbFatal { operation, source },
        }
    }

    /// Whether this error should abort the entire run (as opposed to being contained to
    /// one trial, one clause, or one retried task).
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MatchEngineError::ConfigInvalid { .. }
                | MatchEngineError::DbFatal { .. }
                | MatchEngineError::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification_matches_policy_table() {
        assert!(MatchEngineError::ConfigInvalid {
            reason: "x".into(),
            source: None
        }
        .is_fatal());
        assert!(MatchEngineError::Cancelled.is_fatal());
        assert!(!MatchEngineError::UnmappedHandler {
            handler_name: "h".into(),
            trial_key: "K".into(),
            collection: "genomic".into(),
        }
        .is_fatal());
        assert!(!MatchEngineError::CurationMalformed {
            protocol_no: "NCT1".into(),
            location: "arm[0]".into(),
            reason: "not a list".into(),
        }
        .is_fatal());
    }

    #[test]
    fn display_names_offending_context() {
        let err = MatchEngineError::UnmappedHandler {
            handler_name: "frobnicate".into(),
            trial_key: "HUGO_SYMBOL".into(),
            collection: "genomic".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("frobnicate"));
        assert!(msg.contains("HUGO_SYMBOL"));
    }
}
