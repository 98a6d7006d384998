//! Per-run document cache (§3 `Cache`, §5 shared cache design note)
//!
//! Concurrency-safe map keyed by document id, with a single-flight guard so concurrent
//! misses for the same id across workers don't corrupt state (duplicate fetches are
//! tolerable but wasteful per §5 — this cache avoids them anyway). Hit/miss counters are
//! tracked per collection with relaxed atomics, as the design note recommends.

use crate::criteria::Collection;
use crate::document::{Document, DocumentId};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
}

/// Process-scoped store created per `find_matches` invocation and discarded at the end.
/// Guarantees: a document read committed by any worker is observable by later lookups
/// from the same run (§5), and a document is fetched at most once per run (§3).
pub struct Cache {
    docs: DashMap<DocumentId, Document>,
    pending: DashMap<DocumentId, Arc<Notify>>,
    clinical: Counters,
    genomic: Counters,
}

impl Cache {
    #[must_use]
    pub fn new() -> Self {
        Cache {
            docs: DashMap::new(),
            pending: DashMap::new(),
            clinical: Counters::default(),
            genomic: Counters::default(),
        }
    }

    /// Looks up `id`, recording a hit or miss against `collection`'s counters.
    #[must_use]
    pub fn get(&self, collection: Collection, id: &DocumentId) -> Option<Document> {
        let found = self.docs.get(id).map(|entry| entry.clone());
        let counters = self.counters(collection);
        if found.is_some() {
            counters.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    #[must_use]
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.docs.contains_key(id)
    }

    /// Splits `ids` into ids this caller now owns fetching (`to_fetch`) and ids someone
    /// else is already fetching (`to_await`, resolved via [`Cache::wait_for`]). Ids
    /// already cached are dropped from both lists.
    pub fn claim_missing(&self, ids: &[DocumentId]) -> (Vec<DocumentId>, Vec<DocumentId>) {
        use dashmap::mapref::entry::Entry;
        let mut to_fetch = Vec::new();
        let mut to_await = Vec::new();
        for id in ids {
            if self.docs.contains_key(id) {
                continue;
            }
            match self.pending.entry(id.clone()) {
                Entry::Occupied(_) => to_await.push(id.clone()),
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(Notify::new()));
                    to_fetch.push(id.clone());
                }
            }
        }
        (to_fetch, to_await)
    }

    /// Awaits another worker's in-flight fetch of `id`, returning the document once
    /// populated (or immediately if it already landed).
    pub async fn wait_for(&self, collection: Collection, id: &DocumentId) -> Option<Document> {
        if let Some(doc) = self.docs.get(id).map(|e| e.clone()) {
            return Some(doc);
        }
        if let Some(notify) = self.pending.get(id).map(|e| Arc::clone(&e)) {
            notify.notified().await;
        }
        self.get(collection, id)
    }

    /// Records a fetched document and wakes any worker waiting on it via
    /// [`Cache::wait_for`]. A second `complete_fetch` for the same id is a no-op: cached
    /// documents are immutable once inserted for the run.
    pub fn complete_fetch(&self, id: DocumentId, doc: Document) {
        self.docs.entry(id.clone()).or_insert(doc);
        if let Some((_, notify)) = self.pending.remove(&id) {
            notify.notify_waiters();
        }
    }

    /// Releases a claimed fetch for `id` that did not land a document — a hydration
    /// call failed, or the database simply didn't return this id. Wakes any sibling
    /// worker blocked in [`Cache::wait_for`] instead of leaving it stuck forever; the
    /// waiter observes a cache miss, same as if it had lost the single-flight race.
    pub fn abandon_fetch(&self, id: &DocumentId) {
        if let Some((_, notify)) = self.pending.remove(id) {
            notify.notify_waiters();
        }
    }

    #[must_use]
    pub fn hit_miss(&self, collection: Collection) -> (u64, u64) {
        let counters = self.counters(collection);
        (
            counters.hits.load(Ordering::Relaxed),
            counters.misses.load(Ordering::Relaxed),
        )
    }

    fn counters(&self, collection: Collection) -> &Counters {
        match collection {
            Collection::Clinical => &self.clinical,
            Collection::Genomic => &self.genomic,
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fetch_for_an_id_is_a_cache_miss() {
        let cache = Cache::new();
        let id = DocumentId::from("c1");
        assert!(cache.get(Collection::Clinical, &id).is_none());
        assert_eq!(cache.hit_miss(Collection::Clinical), (0, 1));
    }

    #[test]
    fn second_fetch_after_insert_is_a_hit() {
        let cache = Cache::new();
        let id = DocumentId::from("c1");
        cache.complete_fetch(id.clone(), Document::new());
        assert!(cache.get(Collection::Clinical, &id).is_some());
        assert_eq!(cache.hit_miss(Collection::Clinical), (1, 0));
    }

    #[test]
    fn complete_fetch_is_idempotent_for_repeated_ids() {
        let cache = Cache::new();
        let id = DocumentId::from("c1");
        let mut first = Document::new();
        first.insert("v".to_string(), serde_json::json!(1));
        cache.complete_fetch(id.clone(), first);
        let mut second = Document::new();
        second.insert("v".to_string(), serde_json::json!(2));
        cache.complete_fetch(id.clone(), second);
        let stored = cache.get(Collection::Clinical, &id).unwrap();
        assert_eq!(stored.get("v"), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn wait_for_resolves_once_fetch_completes() {
        let cache = std::sync::Arc::new(Cache::new());
        let id = DocumentId::from("g1");
        let (to_fetch, to_await) = cache.claim_missing(&[id.clone()]);
        assert_eq!(to_fetch, vec![id.clone()]);
        assert!(to_await.is_empty());

        let waiter_cache = cache.clone();
        let waiter_id = id.clone();
        let waiter = tokio::spawn(async move { waiter_cache.wait_for(Collection::Genomic, &waiter_id).await });

        cache.complete_fetch(id.clone(), Document::new());
        let resolved = waiter.await.unwrap();
        assert!(resolved.is_some());
    }
}
