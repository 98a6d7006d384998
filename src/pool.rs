//! Worker pool (§4.8)
//!
//! A bounded pool of `N = min(task_count, configured_workers)` concurrent executors draws
//! tasks from a shared queue, each with its own database handle but a shared cache. A
//! task that fails with a transient database error is re-enqueued once; a second failure
//! (or any fatal error) is surfaced on the result channel and trips the shared
//! cancellation token so sibling workers stop picking up new work.

use crate::cache::Cache;
use crate::cancellation::Cancellation;
use crate::db::Database;
use crate::document::Document;
use crate::error::MatchEngineError;
use crate::executor::execute_path;
use crate::model::MatchClauseData;
use crate::path::MatchPath;
use crate::query::MultiCollectionQuery;
use crate::translate::TransformerContext;
use crate::trial_match::RawQueryResult;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// One unit of work: a fully translated, id-injected path plus the provenance needed to
/// rebuild a `TrialMatch` once results come back.
pub struct PoolTask {
    pub trial: Arc<Document>,
    pub clause_data: Arc<MatchClauseData>,
    pub match_path: Arc<MatchPath>,
    pub queries: Vec<MultiCollectionQuery>,
    retries: u8,
}

impl PoolTask {
    #[must_use]
    pub fn new(
        trial: Arc<Document>,
        clause_data: Arc<MatchClauseData>,
        match_path: Arc<MatchPath>,
        queries: Vec<MultiCollectionQuery>,
    ) -> Self {
        PoolTask {
            trial,
            clause_data,
            match_path,
            queries,
            retries: 0,
        }
    }
}

/// A completed task paired with the raw results it produced.
pub struct TaskOutcome {
    pub trial: Arc<Document>,
    pub clause_data: Arc<MatchClauseData>,
    pub match_path: Arc<MatchPath>,
    pub queries: Vec<MultiCollectionQuery>,
    pub results: Vec<RawQueryResult>,
}

pub struct WorkerPool;

impl WorkerPool {
    /// Spawns `min(tasks.len(), worker_count)` workers over `tasks`, returning a channel
    /// the caller drains until it closes (which happens once every worker has exited,
    /// either by draining the queue or by hitting a fatal error).
    pub fn spawn(
        tasks: Vec<PoolTask>,
        worker_count: usize,
        db_handles: Vec<Arc<dyn Database>>,
        cache: Arc<Cache>,
        ctx: Arc<TransformerContext>,
        cancellation: Cancellation,
    ) -> mpsc::UnboundedReceiver<Result<TaskOutcome, MatchEngineError>> {
        let n = worker_count.min(tasks.len());
        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let (tx, rx) = mpsc::unbounded_channel();

        for worker_id in 0..n {
            let queue = Arc::clone(&queue);
            let db = Arc::clone(&db_handles[worker_id % db_handles.len().max(1)]);
            let cache = Arc::clone(&cache);
            let ctx = Arc::clone(&ctx);
            let cancellation = cancellation.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                loop {
                    if cancellation.is_cancelled() {
                        break;
                    }
                    let task = { queue.lock().await.pop_front() };
                    let Some(mut task) = task else {
                        break;
                    };
                    match execute_path(db.as_ref(), &cache, &cancellation, &ctx, &task.queries).await {
                        Ok(results) => {
                            let outcome = TaskOutcome {
                                trial: task.trial,
                                clause_data: task.clause_data,
                                match_path: task.match_path,
                                queries: task.queries,
                                results,
                            };
                            if tx.send(Ok(outcome)).is_err() {
                                break;
                            }
                        }
                        Err(MatchEngineError::DbTransient { .. }) if task.retries == 0 => {
                            tracing::warn!(worker_id, "transient database error, retrying task once");
                            task.retries = 1;
                            queue.lock().await.push_back(task);
                        }
                        Err(err) => {
                            let fatal = err.is_fatal() || matches!(err, MatchEngineError::DbTransient { .. });
                            let _ = tx.send(Err(err));
                            if fatal {
                                cancellation.cancel();
                                break;
                            }
                        }
                    }
                }
            });
        }
        drop(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Collection;
    use crate::db::InMemoryDatabase;
    use crate::model::{MatchClauseLevel, ParentPath};
    use crate::query::QueryFragment;
    use crate::translate::CollectionMapping;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn ctx() -> Arc<TransformerContext> {
        let mut collection_mappings = BTreeMap::new();
        collection_mappings.insert(
            "genomic".to_string(),
            CollectionMapping {
                join_field: "CLINICAL_ID".to_string(),
            },
        );
        Arc::new(TransformerContext {
            trial_key_mappings: BTreeMap::new(),
            collection_mappings,
            primary_collection_unique_field: "_id".to_string(),
            handlers: crate::handlers::HandlerRegistry::with_builtins(),
            clinical_projection: Vec::new(),
            genomic_projection: Vec::new(),
            trial_projection: Vec::new(),
        })
    }

    fn clause_data() -> Arc<MatchClauseData> {
        Arc::new(MatchClauseData {
            clause: vec![],
            parent_path: ParentPath::new(),
            level: MatchClauseLevel::Arm,
            ambient_attributes: Document::new(),
            protocol_no: "NCT001".to_string(),
        })
    }

    #[tokio::test]
    async fn drains_every_task_and_reports_results() {
        let mut clinical_doc = Document::new();
        clinical_doc.insert("_id".to_string(), json!("c1"));
        let db: Arc<dyn Database> = Arc::new(InMemoryDatabase::new(vec![clinical_doc], vec![], vec![]));
        let cache = Arc::new(Cache::new());
        let cancellation = Cancellation::new();

        let mut q = MultiCollectionQuery::new();
        let mut clinical_fragment = QueryFragment::new();
        clinical_fragment.insert("_id".to_string(), json!("c1"));
        q.push_fragment("clinical", clinical_fragment);

        let trial = Arc::new(Document::new());
        let task = PoolTask::new(trial, clause_data(), Arc::new(MatchPath::default()), vec![q]);

        let mut rx = WorkerPool::spawn(vec![task], 2, vec![db], cache, ctx(), cancellation);
        let outcome = rx.recv().await.unwrap().unwrap();
        assert_eq!(outcome.results.len(), 1);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn unused_collection_import_keeps_module_self_contained() {
        let _ = Collection::Clinical;
    }
}
