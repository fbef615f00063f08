//! Recording cache for tests
//!
//! [`RecordingCache`] is an unbounded [`ListingCache`] that counts hits, misses,
//! puts and per-namespace invalidations so tests can assert on cache traffic.
//! Like the production cache, it discards pages read before an eviction.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use listings_core::cache::{CacheFuture, CacheKey, CacheNamespace, ListingCache};
use listings_core::query::ResultPage;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct State {
    entries: HashMap<(CacheNamespace, CacheKey), ResultPage>,
    hits: usize,
    misses: usize,
    puts: usize,
    stale_puts: usize,
    invalidations: HashMap<CacheNamespace, usize>,
}

impl State {
    // Every invalidation advances the generation by one.
    fn generation(&self, namespace: CacheNamespace) -> u64 {
        let count = self.invalidations.get(&namespace).copied().unwrap_or(0);
        u64::try_from(count).unwrap()
    }
}

/// Unbounded cache that records its traffic.
#[derive(Clone, Debug, Default)]
pub struct RecordingCache {
    state: Arc<Mutex<State>>,
}

impl RecordingCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls that found an entry.
    #[must_use]
    pub fn hits(&self) -> usize {
        self.state.lock().unwrap().hits
    }

    /// Number of `get` calls that found nothing.
    #[must_use]
    pub fn misses(&self) -> usize {
        self.state.lock().unwrap().misses
    }

    /// Number of `put` calls that stored a page.
    #[must_use]
    pub fn puts(&self) -> usize {
        self.state.lock().unwrap().puts
    }

    /// Number of `put` calls discarded because the namespace was evicted
    /// after the page was read.
    #[must_use]
    pub fn stale_puts(&self) -> usize {
        self.state.lock().unwrap().stale_puts
    }

    /// Number of `invalidate_all` calls for `namespace`.
    #[must_use]
    pub fn invalidations(&self, namespace: CacheNamespace) -> usize {
        self.state
            .lock()
            .unwrap()
            .invalidations
            .get(&namespace)
            .copied()
            .unwrap_or(0)
    }

    /// Number of cached entries in `namespace`.
    #[must_use]
    pub fn len(&self, namespace: CacheNamespace) -> usize {
        self.state
            .lock()
            .unwrap()
            .entries
            .keys()
            .filter(|(ns, _)| *ns == namespace)
            .count()
    }
}

impl ListingCache for RecordingCache {
    fn get<'a>(
        &'a self,
        namespace: CacheNamespace,
        key: &'a CacheKey,
    ) -> CacheFuture<'a, Option<ResultPage>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            let found = state.entries.get(&(namespace, key.clone())).cloned();
            if found.is_some() {
                state.hits += 1;
            } else {
                state.misses += 1;
            }
            found
        })
    }

    fn generation(&self, namespace: CacheNamespace) -> CacheFuture<'_, u64> {
        Box::pin(async move { self.state.lock().unwrap().generation(namespace) })
    }

    fn put(
        &self,
        namespace: CacheNamespace,
        key: CacheKey,
        page: ResultPage,
        generation: u64,
    ) -> CacheFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            if state.generation(namespace) == generation {
                state.puts += 1;
                state.entries.insert((namespace, key), page);
            } else {
                state.stale_puts += 1;
            }
        })
    }

    fn invalidate_all(&self, namespace: CacheNamespace) -> CacheFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.entries.retain(|(ns, _), _| *ns != namespace);
            *state.invalidations.entry(namespace).or_insert(0) += 1;
        })
    }
}
