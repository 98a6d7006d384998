//! Configuration loading (§6 configuration document, SPEC_FULL.md §2.1)
//!
//! Provides hierarchical configuration loading from:
//! - `config.toml` (default configuration)
//! - `config.local.toml` (git-ignored local overrides)
//! - Environment variables (`MATCHENGINE_` prefix)
//!
//! ## Example
//!
//! ```toml
//! # config.toml
//! primary_collection_unique_field = "_id"
//!
//! [collection_mappings.genomic]
//! join_field = "CLINICAL_ID"
//!
//! [trial_key_mappings.genomic.HUGO_SYMBOL]
//! sample_value = "nomap"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! MATCHENGINE_DATABASE__URI=mongodb://localhost/trials
//! MATCHENGINE_RUNTIME__LOG_LEVEL=debug
//! ```

use crate::translate::{CollectionMapping, KeyMapping, TransformerContext};
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level configuration document (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// `trial_key_mappings[collection][UPPERCASE_KEY] -> mapping entry`.
    #[serde(default)]
    pub trial_key_mappings: BTreeMap<String, BTreeMap<String, KeyMapping>>,

    /// `collection_mappings[collection] -> { join_field, ... }`.
    #[serde(default)]
    pub collection_mappings: BTreeMap<String, CollectionMapping>,

    /// Expected value `_id`; the field used to key the clinical collection.
    #[serde(default = "default_unique_field")]
    pub primary_collection_unique_field: String,

    /// Extra trial fields merged with the §4.9 minimum projection.
    #[serde(default)]
    pub trial_projection: Vec<String>,

    /// Extra clinical fields merged with the §4.6 minimum projection.
    #[serde(default)]
    pub clinical_projection: Vec<String>,

    /// Extra genomic fields merged with the §4.6 minimum projection.
    #[serde(default)]
    pub genomic_projection: Vec<String>,

    /// Out-of-scope driver connection settings, passed through opaquely.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Worker count default and logging knobs.
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Connection settings for the out-of-scope document-store driver. The core never
/// inspects these fields itself — they exist only so a binary wiring a real driver has
/// somewhere to read them from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_uri")]
    pub uri: String,

    #[serde(default = "default_db_name")]
    pub database_name: String,

    #[serde(default)]
    pub read_only: bool,

    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            uri: default_db_uri(),
            database_name: default_db_name(),
            read_only: false,
            max_pool_size: default_max_pool_size(),
        }
    }
}

/// Runtime/logging knobs (ADDED per SPEC_FULL.md §2.1/§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Default worker pool size when `-workers` is not given on the CLI: `5 * CPU count`
    /// per §6, computed lazily by [`RuntimeConfig::effective_worker_count`] rather than
    /// baked into a constant, since the CPU count is only known at process startup.
    #[serde(default)]
    pub worker_count: Option<usize>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            worker_count: None,
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl RuntimeConfig {
    /// Resolves the effective worker count: the configured override, or `5 * CPU count`.
    #[must_use]
    pub fn effective_worker_count(&self) -> usize {
        self.worker_count.unwrap_or_else(|| 5 * num_cpus::get())
    }
}

fn default_unique_field() -> String {
    "_id".to_string()
}

fn default_db_uri() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_db_name() -> String {
    "matchminer".to_string()
}

fn default_max_pool_size() -> u32 {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Merges in order:
    /// 1. `config.toml` (base configuration)
    /// 2. `config.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`MATCHENGINE_` prefix)
    pub fn load() -> Result<Self, crate::error::MatchEngineError> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("MATCHENGINE_").split("__"))
            .extract()
            .map_err(Into::into)
    }

    /// Load configuration from a specific file path (`--config`).
    pub fn from_file(path: &str) -> Result<Self, crate::error::MatchEngineError> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("MATCHENGINE_").split("__"))
            .extract()
            .map_err(Into::into)
    }

    /// Builds the transformer context the query translator consumes, validating that the
    /// mandatory `genomic` collection mapping (the join field) is present — a config
    /// missing it cannot translate a single genomic criterion, so this fails fast at
    /// startup rather than surfacing as an `UnmappedHandler` deep in a run.
    pub fn transformer_context(&self) -> Result<TransformerContext, crate::error::MatchEngineError> {
        if !self.collection_mappings.contains_key("genomic") {
            return Err(crate::error::MatchEngineError::ConfigInvalid {
                reason: "collection_mappings.genomic (join_field) is required".to_string(),
                source: None,
            });
        }
        Ok(TransformerContext {
            trial_key_mappings: self.trial_key_mappings.clone(),
            collection_mappings: self.collection_mappings.clone(),
            primary_collection_unique_field: self.primary_collection_unique_field.clone(),
            handlers: crate::handlers::HandlerRegistry::with_builtins(),
            clinical_projection: self.clinical_projection.clone(),
            genomic_projection: self.genomic_projection.clone(),
            trial_projection: self.trial_projection.clone(),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        let mut collection_mappings = BTreeMap::new();
        collection_mappings.insert(
            "genomic".to_string(),
            CollectionMapping {
                join_field: "CLINICAL_ID".to_string(),
            },
        );
        Config {
            trial_key_mappings: BTreeMap::new(),
            collection_mappings,
            primary_collection_unique_field: default_unique_field(),
            trial_projection: Vec::new(),
            clinical_projection: Vec::new(),
            genomic_projection: Vec::new(),
            database: DatabaseConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_genomic_join_field() {
        let config = Config::default();
        assert_eq!(
            config.collection_mappings.get("genomic").unwrap().join_field,
            "CLINICAL_ID"
        );
        assert_eq!(config.primary_collection_unique_field, "_id");
    }

    #[test]
    fn transformer_context_rejects_missing_genomic_mapping() {
        let mut config = Config::default();
        config.collection_mappings.remove("genomic");
        let err = config.transformer_context().unwrap_err();
        assert!(matches!(err, crate::error::MatchEngineError::ConfigInvalid { .. }));
    }

    #[test]
    fn transformer_context_builds_from_valid_config() {
        let config = Config::default();
        assert!(config.transformer_context().is_ok());
    }

    #[test]
    fn effective_worker_count_falls_back_to_cpu_multiple() {
        let runtime = RuntimeConfig::default();
        assert_eq!(runtime.effective_worker_count(), 5 * num_cpus::get());
        let runtime = RuntimeConfig {
            worker_count: Some(3),
            ..RuntimeConfig::default()
        };
        assert_eq!(runtime.effective_worker_count(), 3);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        assert!(toml_str.contains("primary_collection_unique_field"));
    }
}
