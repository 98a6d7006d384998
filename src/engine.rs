//! `find_matches` entry point (§4.9)
//!
//! Orchestrates the whole pipeline: load the transformer context, fetch and filter
//! trials, resolve the clinical prefilter once, extract/build/enumerate/translate every
//! trial's clauses into worker-pool tasks, and drain the pool's result channel into a
//! stream of [`TrialMatch`]. The single public async entry point library consumers (the
//! CLI binary, or any other driver) call.

use crate::cache::Cache;
use crate::cancellation::Cancellation;
use crate::clause::extract_match_clauses;
use crate::config::Config;
use crate::criteria::Collection;
use crate::db::Database;
use crate::document::{document_id_from_value, merge_projection, Document, DocumentId};
use crate::error::MatchEngineError;
use crate::model::MatchClauseData;
use crate::path::enumerate_paths;
use crate::pool::{PoolTask, WorkerPool};
use crate::query::QueryFragment;
use crate::translate::{inject_ids, translate_path, TransformerContext};
use crate::tree::build_tree;
use crate::trial_match::TrialMatch;
use futures::stream::{self, Stream};
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;

const MIN_TRIAL_PROJECTION: &[&str] = &["protocol_no", "nct_id", "status", "treatment_list"];

/// A stream of results: `Ok(TrialMatch)` for every emitted match, `Err` for a
/// non-fatal per-path failure the caller may still want visibility into (fatal errors
/// instead short-circuit `find_matches` itself, per §7).
pub type MatchStream = Pin<Box<dyn Stream<Item = Result<TrialMatch, MatchEngineError>> + Send>>;

/// The restrictions and flags a CLI invocation (or any other caller) supplies to one
/// matching run.
#[derive(Debug, Clone, Default)]
pub struct FindMatchesRequest {
    /// Restrict to these protocol numbers; `None` = all trials.
    pub protocol_nos: Option<Vec<String>>,
    /// Restrict to these sample ids; `None` = all live patients (§4.7).
    pub sample_ids: Option<Vec<String>>,
    /// Include closed trials and suspended steps/arms/doses.
    pub match_on_closed: bool,
    /// Include deceased patients when no explicit `sample_ids` are given.
    pub match_on_deceased: bool,
    /// Worker pool size; `None` defers to `config.runtime.effective_worker_count()`.
    pub worker_count: Option<usize>,
    /// Translate every path and log the resulting queries, but never dispatch them to the
    /// worker pool or touch the `clinical`/`genomic` collections (§6, ADDED).
    pub dry_run: bool,
}

/// Runs one matching pass: trial loading/filtering, clause extraction, tree/path
/// construction, translation, id injection, and worker-pool dispatch.
///
/// Fatal errors (`ConfigInvalid`, `DbFatal`, an escalated `DbTransient`, `Cancelled`)
/// abort the whole run. An `UnmappedHandler` during translation is contained to the
/// owning trial: it is logged and the trial's remaining clauses/paths are skipped, but
/// the run continues with the next trial (§7).
pub async fn find_matches(
    db: Arc<dyn Database>,
    config: &Config,
    request: &FindMatchesRequest,
    cancellation: Cancellation,
) -> Result<MatchStream, MatchEngineError> {
    let ctx = Arc::new(config.transformer_context()?);

    let trial_projection = merge_projection(MIN_TRIAL_PROJECTION, &config.trial_projection);
    let trials = db
        .find_trials(request.protocol_nos.as_deref(), &trial_projection)
        .await
        .map_err(|e| MatchEngineError::from_db("find_trials", e))?;

    let accepted_trials = filter_open_trials(trials, request.match_on_closed);
    tracing::info!(accepted = accepted_trials.len(), "trials accepted for matching");

    let candidate_ids = resolve_candidate_clinical_ids(db.as_ref(), request).await?;
    tracing::debug!(candidates = candidate_ids.len(), "clinical prefilter resolved");

    let tasks = build_tasks(&accepted_trials, request.match_on_closed, &ctx, &candidate_ids);
    tracing::info!(tasks = tasks.len(), "translated paths enqueued");

    if request.dry_run {
        for task in &tasks {
            tracing::info!(
                protocol_no = %task.clause_data.protocol_no,
                queries = ?task.queries,
                "dry run: translated query (not executed)"
            );
        }
        tracing::info!(tasks = tasks.len(), "dry run complete, no query executed against the database");
        let empty: Vec<Result<TrialMatch, MatchEngineError>> = Vec::new();
        return Ok(Box::pin(stream::iter(empty)));
    }

    let worker_count = request
        .worker_count
        .unwrap_or_else(|| config.runtime.effective_worker_count());
    let db_handles: Vec<Arc<dyn Database>> = (0..worker_count.max(1)).map(|_| Arc::clone(&db)).collect();
    let cache = Arc::new(Cache::new());

    let mut rx = WorkerPool::spawn(tasks, worker_count, db_handles, Arc::clone(&cache), Arc::clone(&ctx), cancellation);

    let mut items: Vec<Result<TrialMatch, MatchEngineError>> = Vec::new();
    while let Some(outcome) = rx.recv().await {
        match outcome {
            Ok(outcome) => {
                for raw in outcome.results {
                    items.push(Ok(TrialMatch {
                        trial: (*outcome.trial).clone(),
                        clause_data: (*outcome.clause_data).clone(),
                        raw_query_result: raw,
                    }));
                }
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => items.push(Err(err)),
        }
    }

    let (clinical_hits, clinical_misses) = cache.hit_miss(Collection::Clinical);
    let (genomic_hits, genomic_misses) = cache.hit_miss(Collection::Genomic);
    tracing::info!(
        clinical_hits,
        clinical_misses,
        genomic_hits,
        genomic_misses,
        matches = items.len(),
        "matching run complete"
    );

    Ok(Box::pin(stream::iter(items)))
}

fn filter_open_trials(trials: Vec<Document>, match_on_closed: bool) -> Vec<Document> {
    if match_on_closed {
        return trials;
    }
    trials
        .into_iter()
        .filter(|trial| {
            let protocol_no = trial.get("protocol_no").and_then(Value::as_str).unwrap_or_default();
            let status = trial.get("status").and_then(Value::as_str).unwrap_or_default();
            let open = status.trim().eq_ignore_ascii_case("open to accrual");
            if !open {
                tracing::debug!(protocol_no, status, "skipping closed trial");
            }
            open
        })
        .collect()
}

/// Resolves the candidate clinical id set once (§4.7), before any trial's paths are
/// translated, so `inject_ids` can narrow every path's clinical query up front.
async fn resolve_candidate_clinical_ids(
    db: &dyn Database,
    request: &FindMatchesRequest,
) -> Result<Vec<DocumentId>, MatchEngineError> {
    let mut fragment = QueryFragment::new();
    match &request.sample_ids {
        Some(sample_ids) => {
            let values: Vec<Value> = sample_ids.iter().cloned().map(Value::String).collect();
            let mut in_map = serde_json::Map::new();
            in_map.insert("IN".to_string(), Value::Array(values));
            fragment.insert("SAMPLE_ID".to_string(), Value::Object(in_map));
        }
        None if !request.match_on_deceased => {
            fragment.insert("VITAL_STATUS".to_string(), Value::String("alive".to_string()));
        }
        None => {}
    }
    let docs = db
        .find("clinical", &[fragment], &["_id".to_string()])
        .await
        .map_err(|e| MatchEngineError::from_db("clinical prefilter", e))?;
    Ok(docs
        .iter()
        .filter_map(|doc| doc.get("_id").and_then(document_id_from_value))
        .collect())
}

/// Walks every accepted trial's extracted clauses, building one [`PoolTask`] per
/// enumerated path. An `UnmappedHandler` encountered while translating a trial's path
/// aborts that trial's remaining clauses/paths (logged), not the whole run.
fn build_tasks(
    trials: &[Document],
    match_on_closed: bool,
    ctx: &Arc<TransformerContext>,
    candidate_ids: &[DocumentId],
) -> Vec<PoolTask> {
    let mut tasks = Vec::new();
    for trial in trials {
        let trial_arc = Arc::new(trial.clone());
        let clauses: Vec<MatchClauseData> = extract_match_clauses(trial, match_on_closed);
        'trial: for clause_data in clauses {
            let tree = build_tree(&clause_data.clause);
            let paths = enumerate_paths(&tree);
            let clause_arc = Arc::new(clause_data.clone());
            for path in paths {
                match translate_path(&clause_data, &path, ctx) {
                    Ok(mut queries) => {
                        inject_ids(&mut queries, Some(candidate_ids), ctx);
                        tasks.push(PoolTask::new(Arc::clone(&trial_arc), Arc::clone(&clause_arc), Arc::new(path), queries));
                    }
                    Err(err) => {
                        tracing::warn!(
                            protocol_no = %clause_data.protocol_no,
                            error = %err,
                            "translation failed, skipping remaining paths for this trial"
                        );
                        break 'trial;
                    }
                }
            }
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::InMemoryDatabase;
    use crate::translate::CollectionMapping;
    use futures::StreamExt;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn config() -> Config {
        let mut collection_mappings = BTreeMap::new();
        collection_mappings.insert(
            "genomic".to_string(),
            CollectionMapping {
                join_field: "CLINICAL_ID".to_string(),
            },
        );
        Config {
            collection_mappings,
            ..Config::default()
        }
    }

    fn trial(protocol_no: &str, status: &str, step: Value) -> Document {
        json!({
            "protocol_no": protocol_no,
            "status": status,
            "treatment_list": {"step": [step]},
        })
        .as_object()
        .unwrap()
        .clone()
    }

    fn doc(id: &str, fields: Value) -> Document {
        let mut m = fields.as_object().unwrap().clone();
        m.insert("_id".to_string(), json!(id));
        m
    }

    #[tokio::test]
    async fn end_to_end_single_leaf_clause_emits_a_match() {
        let trials = vec![trial(
            "NCT001",
            "Open to Accrual",
            json!({
                "arm": [{
                    "match": [{"genomic": {"HUGO_SYMBOL": "BRAF"}}]
                }]
            }),
        )];
        let clinical = vec![doc("c1", json!({"VITAL_STATUS": "alive"}))];
        let genomic = vec![doc("g1", json!({"CLINICAL_ID": "c1", "HUGO_SYMBOL": "BRAF"}))];
        let db: Arc<dyn Database> = Arc::new(InMemoryDatabase::new(clinical, genomic, trials));

        let stream = find_matches(db, &config(), &FindMatchesRequest::default(), Cancellation::new())
            .await
            .unwrap();
        let results: Vec<_> = stream.collect().await;
        assert_eq!(results.len(), 1);
        let m = results[0].as_ref().unwrap();
        assert_eq!(m.trial.get("protocol_no"), Some(&json!("NCT001")));
        assert_eq!(m.raw_query_result.clinical_id, DocumentId::from("c1"));
    }

    #[tokio::test]
    async fn closed_trial_is_skipped_unless_match_on_closed() {
        let trials = vec![trial(
            "NCT002",
            "closed to accrual",
            json!({"arm": [{"match": [{"clinical": {"X": 1}}]}]}),
        )];
        let db: Arc<dyn Database> = Arc::new(InMemoryDatabase::new(vec![], vec![], trials));

        let stream = find_matches(db, &config(), &FindMatchesRequest::default(), Cancellation::new())
            .await
            .unwrap();
        let results: Vec<_> = stream.collect().await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn dry_run_translates_but_emits_nothing() {
        let trials = vec![trial(
            "NCT004",
            "Open to Accrual",
            json!({
                "arm": [{
                    "match": [{"genomic": {"HUGO_SYMBOL": "BRAF"}}]
                }]
            }),
        )];
        let clinical = vec![doc("c1", json!({"VITAL_STATUS": "alive"}))];
        let genomic = vec![doc("g1", json!({"CLINICAL_ID": "c1", "HUGO_SYMBOL": "BRAF"}))];
        let db: Arc<dyn Database> = Arc::new(InMemoryDatabase::new(clinical, genomic, trials));

        let request = FindMatchesRequest {
            dry_run: true,
            ..FindMatchesRequest::default()
        };
        let stream = find_matches(db, &config(), &request, Cancellation::new()).await.unwrap();
        let results: Vec<_> = stream.collect().await;
        assert!(results.is_empty(), "dry run must not dispatch any task to the worker pool");
    }

    #[tokio::test]
    async fn unmapped_handler_skips_trial_but_does_not_abort_the_run() {
        let trials = vec![trial(
            "NCT003",
            "Open to Accrual",
            json!({"arm": [{"match": [{"genomic": {"WEIRD_KEY": "x"}}]}]}),
        )];
        let db: Arc<dyn Database> = Arc::new(InMemoryDatabase::new(vec![], vec![], trials));

        let mut cfg = config();
        cfg.trial_key_mappings.insert("genomic".to_string(), {
            let mut m = BTreeMap::new();
            m.insert(
                "WEIRD_KEY".to_string(),
                crate::translate::KeyMapping {
                    sample_value: "not_registered".to_string(),
                    ignore: false,
                    options: BTreeMap::new(),
                },
            );
            m
        });

        let stream = find_matches(db, &cfg, &FindMatchesRequest::default(), Cancellation::new())
            .await
            .unwrap();
        let results: Vec<_> = stream.collect().await;
        assert!(results.is_empty());
    }
}
