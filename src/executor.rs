//! Query executor (§4.6)
//!
//! Clinical-first filtering, narrowing genomic lookups to the surviving clinical ids,
//! hydrating the full documents through the cache, and emitting one [`RawQueryResult`]
//! per surviving clinical id. Runs one translated, id-injected path at a time; the
//! worker pool (`pool.rs`) is what fans this out across paths concurrently.

use crate::cache::Cache;
use crate::cancellation::Cancellation;
use crate::criteria::Collection;
use crate::db::Database;
use crate::document::{document_id_from_value, merge_projection, DocumentId};
use crate::error::MatchEngineError;
use crate::query::{MultiCollectionQuery, QueryFragment};
use crate::translate::TransformerContext;
use crate::trial_match::RawQueryResult;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

const MIN_CLINICAL_PROJECTION: &[&str] = &["SAMPLE_ID", "MRN", "ONCOTREE_PRIMARY_DIAGNOSIS_NAME", "VITAL_STATUS", "FIRST_LAST"];
const MIN_GENOMIC_PROJECTION: &[&str] = &[
    "SAMPLE_ID",
    "CLINICAL_ID",
    "VARIANT_CATEGORY",
    "WILDTYPE",
    "TIER",
    "TRUE_HUGO_SYMBOL",
    "TRUE_PROTEIN_CHANGE",
    "CNV_CALL",
    "TRUE_VARIANT_CLASSIFICATION",
    "MMR_STATUS",
];

fn in_fragment(ids: &HashSet<DocumentId>) -> Value {
    let mut m = serde_json::Map::new();
    let values: Vec<Value> = ids.iter().cloned().map(Value::from).collect();
    m.insert("IN".to_string(), Value::Array(values));
    Value::Object(m)
}

fn db_error(operation: &str, err: crate::db::DbError) -> MatchEngineError {
    MatchEngineError::from_db(operation, err)
}

/// Executes one fully translated, id-injected path (a list of per-node
/// [`MultiCollectionQuery`]s, semantically ANDed across nodes) against `db`, hydrating
/// through `cache`. Returns an empty vector (not an error) when the conjunction narrows
/// to no surviving clinical ids at any point — absence of matches is a normal outcome.
pub async fn execute_path(
    db: &dyn Database,
    cache: &Cache,
    cancellation: &Cancellation,
    ctx: &TransformerContext,
    queries: &[MultiCollectionQuery],
) -> Result<Vec<RawQueryResult>, MatchEngineError> {
    let join_field = ctx.join_field_for(Collection::Genomic).unwrap_or("CLINICAL_ID").to_string();
    let mut clinical_ids: HashSet<DocumentId> = HashSet::new();
    let mut all_results: HashMap<DocumentId, HashSet<DocumentId>> = HashMap::new();

    for query in queries {
        if cancellation.is_cancelled() {
            return Err(MatchEngineError::Cancelled);
        }

        let clinical_docs = db
            .find("clinical", query.fragments("clinical"), &["_id".to_string()])
            .await
            .map_err(|e| db_error("clinical find", e))?;
        let new_clinical_ids: HashSet<DocumentId> = clinical_docs
            .iter()
            .filter_map(|d| d.get("_id").and_then(document_id_from_value))
            .collect();
        if new_clinical_ids.is_empty() {
            return Ok(Vec::new());
        }
        clinical_ids.extend(new_clinical_ids);

        for genomic_fragment in query.fragments("genomic") {
            if cancellation.is_cancelled() {
                return Err(MatchEngineError::Cancelled);
            }
            let mut augmented: QueryFragment = genomic_fragment.clone();
            augmented.insert(join_field.clone(), in_fragment(&clinical_ids));

            let docs = db
                .find(
                    "genomic",
                    &[augmented],
                    &["_id".to_string(), join_field.clone()],
                )
                .await
                .map_err(|e| db_error("genomic find", e))?;

            let mut surviving_clinical = HashSet::new();
            for doc in &docs {
                let Some(genomic_id) = doc.get("_id").and_then(document_id_from_value) else {
                    continue;
                };
                let Some(clinical_id) = doc.get(&join_field).and_then(document_id_from_value) else {
                    continue;
                };
                all_results.entry(clinical_id.clone()).or_default().insert(genomic_id);
                surviving_clinical.insert(clinical_id);
            }
            clinical_ids.retain(|id| surviving_clinical.contains(id));
            if clinical_ids.is_empty() {
                return Ok(Vec::new());
            }
        }
    }

    if all_results.is_empty() {
        // Clinical-only path: every surviving clinical id is its own result with no
        // genomic docs (§4.6 edge case).
        for id in &clinical_ids {
            all_results.entry(id.clone()).or_default();
        }
    }

    if cancellation.is_cancelled() {
        return Err(MatchEngineError::Cancelled);
    }

    hydrate(db, cache, &ctx.clinical_projection, &ctx.genomic_projection, &all_results).await?;

    let mut out = Vec::with_capacity(all_results.len());
    for (clinical_id, genomic_ids) in &all_results {
        let Some(clinical_doc) = cache.get(Collection::Clinical, clinical_id) else {
            continue;
        };
        let genomic_docs = genomic_ids
            .iter()
            .filter_map(|id| cache.get(Collection::Genomic, id))
            .collect();
        out.push(RawQueryResult {
            source_query: queries.to_vec(),
            clinical_id: clinical_id.clone(),
            clinical_doc,
            genomic_docs,
        });
    }
    Ok(out)
}

async fn hydrate(
    db: &dyn Database,
    cache: &Cache,
    clinical_extra: &[String],
    genomic_extra: &[String],
    all_results: &HashMap<DocumentId, HashSet<DocumentId>>,
) -> Result<(), MatchEngineError> {
    let clinical_ids: Vec<DocumentId> = all_results.keys().cloned().collect();
    let genomic_ids: Vec<DocumentId> = all_results.values().flatten().cloned().collect();

    let (clinical_to_fetch, clinical_to_await) = cache.claim_missing(&clinical_ids);
    let (genomic_to_fetch, genomic_to_await) = cache.claim_missing(&genomic_ids);

    let clinical_projection = merge_projection(MIN_CLINICAL_PROJECTION, clinical_extra);
    let genomic_projection = merge_projection(MIN_GENOMIC_PROJECTION, genomic_extra);

    let (clinical_fetched, genomic_fetched) = tokio::join!(
        db.find_by_ids("clinical", &clinical_to_fetch, &clinical_projection),
        db.find_by_ids("genomic", &genomic_to_fetch, &genomic_projection),
    );

    // Either call failing leaves some or all of `clinical_to_fetch`/`genomic_to_fetch`
    // without a matching `complete_fetch`. Abandon every id this worker claimed before
    // propagating the error so a sibling worker blocked in `wait_for` on the same id
    // (cache.rs) wakes with a miss instead of hanging forever.
    let clinical_fetched = match clinical_fetched {
        Ok(docs) => docs,
        Err(e) => {
            abandon_all(cache, &clinical_to_fetch, &genomic_to_fetch);
            return Err(db_error("clinical hydration", e));
        }
    };
    let genomic_fetched = match genomic_fetched {
        Ok(docs) => docs,
        Err(e) => {
            abandon_all(cache, &clinical_to_fetch, &genomic_to_fetch);
            return Err(db_error("genomic hydration", e));
        }
    };

    let clinical_landed = complete_fetched(cache, clinical_fetched);
    let genomic_landed = complete_fetched(cache, genomic_fetched);

    // The database may simply not return a doc for every requested id (deleted,
    // filtered by a projection clash, …); abandon those too rather than leave them
    // pending.
    for id in &clinical_to_fetch {
        if !clinical_landed.contains(id) {
            cache.abandon_fetch(id);
        }
    }
    for id in &genomic_to_fetch {
        if !genomic_landed.contains(id) {
            cache.abandon_fetch(id);
        }
    }

    for id in clinical_to_await {
        cache.wait_for(Collection::Clinical, &id).await;
    }
    for id in genomic_to_await {
        cache.wait_for(Collection::Genomic, &id).await;
    }
    Ok(())
}

fn abandon_all(cache: &Cache, clinical_to_fetch: &[DocumentId], genomic_to_fetch: &[DocumentId]) {
    for id in clinical_to_fetch {
        cache.abandon_fetch(id);
    }
    for id in genomic_to_fetch {
        cache.abandon_fetch(id);
    }
}

fn complete_fetched(cache: &Cache, docs: Vec<crate::document::Document>) -> HashSet<DocumentId> {
    let mut landed = HashSet::new();
    for doc in docs {
        if let Some(id) = doc.get("_id").and_then(document_id_from_value) {
            cache.complete_fetch(id.clone(), doc);
            landed.insert(id);
        }
    }
    landed
}
