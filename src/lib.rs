//! # matchengine
//!
//! Matches patients against clinical-trial eligibility criteria over two document
//! collections (clinical and genomic), via a configurable key-mapping layer and a
//! bounded concurrent executor with cross-collection joins and caching.
//!
//! ## Pipeline
//!
//! ```text
//! Trial
//!   -> Clause Extractor    (clause.rs)   -> MatchClauseData{}
//!   -> Tree Builder        (tree.rs)     -> MatchTree
//!   -> Path Enumerator     (path.rs)     -> MatchPath{}
//!   -> Query Translator    (translate.rs)-> MultiCollectionQuery{}
//!   -> ID Injection        (translate.rs)
//!   -> Worker Pool         (pool.rs)     -> fans out to
//!   -> Query Executor      (executor.rs) -> RawQueryResult{}
//!   -> find_matches        (engine.rs)   -> TrialMatch stream
//!   -> Trial-Match Shaping (trial_match.rs) -> persistable documents
//! ```
//!
//! The core never performs I/O itself outside the [`db::Database`] trait boundary; no
//! networked driver is shipped, only the trait and an in-memory fake used by tests.

pub mod cache;
pub mod cancellation;
pub mod clause;
pub mod cli;
pub mod config;
pub mod criteria;
pub mod db;
pub mod document;
pub mod engine;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod logging;
pub mod model;
pub mod path;
pub mod pool;
pub mod query;
pub mod translate;
pub mod tree;
pub mod trial_match;

pub use config::Config;
pub use engine::{find_matches, FindMatchesRequest, MatchStream};
pub use error::MatchEngineError;
pub use trial_match::{flatten_trial_match, RawQueryResult, TrialMatch};
