//! Bounded in-process cache of result pages.
//!
//! Entries expire after a fixed time-to-live and the least recently used entry
//! is evicted once the capacity is reached. All state sits behind a single
//! lock, so every operation is atomic per key.

use listings_core::cache::{CacheFuture, CacheKey, CacheNamespace, ListingCache};
use listings_core::query::ResultPage;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockWriteGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Default number of cached pages across all namespaces.
pub const DEFAULT_CAPACITY: usize = 1_000;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

type EntryKey = (CacheNamespace, CacheKey);

#[derive(Debug)]
struct Entry {
    page: ResultPage,
    expires_at: Instant,
    last_used: u64,
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<EntryKey, Entry>,
    /// Recency index: use tick -> key, oldest first.
    recency: BTreeMap<u64, EntryKey>,
    tick: u64,
    generations: HashMap<CacheNamespace, u64>,
}

impl State {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn remove(&mut self, key: &EntryKey) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.recency.remove(&entry.last_used);
        Some(entry)
    }

    fn generation(&self, namespace: CacheNamespace) -> u64 {
        self.generations.get(&namespace).copied().unwrap_or(0)
    }

    fn evict_oldest(&mut self) {
        if let Some((_, key)) = self.recency.pop_first() {
            self.entries.remove(&key);
        }
    }
}

/// In-memory [`ListingCache`] with capacity and TTL bounds.
///
/// # Example
///
/// ```
/// use listings_runtime::cache::InMemoryListingCache;
/// use std::time::Duration;
///
/// let cache = InMemoryListingCache::new(500, Duration::from_secs(60));
/// assert!(cache.is_empty());
/// ```
#[derive(Debug)]
pub struct InMemoryListingCache {
    capacity: usize,
    ttl: Duration,
    state: RwLock<State>,
}

impl Default for InMemoryListingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_TTL)
    }
}

impl InMemoryListingCache {
    /// Create a cache holding at most `capacity` pages for `ttl` each.
    ///
    /// A capacity of zero disables caching.
    #[must_use]
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            state: RwLock::new(State::default()),
        }
    }

    /// Number of entries currently held, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, namespace: CacheNamespace, key: &CacheKey) -> Option<ResultPage> {
        let mut state = self.write();
        let entry_key = (namespace, key.clone());
        let now = Instant::now();

        let expired = state.entries.get(&entry_key)?.expires_at <= now;
        if expired {
            state.remove(&entry_key);
            return None;
        }

        let tick = state.next_tick();
        let entry = state.entries.get_mut(&entry_key)?;
        let previous = std::mem::replace(&mut entry.last_used, tick);
        let page = entry.page.clone();
        state.recency.remove(&previous);
        state.recency.insert(tick, entry_key);
        Some(page)
    }

    fn store(
        &self,
        namespace: CacheNamespace,
        key: CacheKey,
        page: ResultPage,
        generation: u64,
    ) {
        if self.capacity == 0 {
            return;
        }

        let mut state = self.write();
        if state.generation(namespace) != generation {
            tracing::debug!(namespace = %namespace, key = %key, "Discarding page read before eviction");
            return;
        }
        let entry_key = (namespace, key);
        state.remove(&entry_key);
        while state.entries.len() >= self.capacity {
            state.evict_oldest();
        }

        let tick = state.next_tick();
        state.recency.insert(tick, entry_key.clone());
        state.entries.insert(
            entry_key,
            Entry {
                page,
                expires_at: Instant::now() + self.ttl,
                last_used: tick,
            },
        );
    }

    fn evict_namespace(&self, namespace: CacheNamespace) {
        let mut state = self.write();
        let keys: Vec<EntryKey> = state
            .entries
            .keys()
            .filter(|(ns, _)| *ns == namespace)
            .cloned()
            .collect();
        for key in &keys {
            state.remove(key);
        }
        *state.generations.entry(namespace).or_insert(0) += 1;
    }
}

impl ListingCache for InMemoryListingCache {
    fn get<'a>(
        &'a self,
        namespace: CacheNamespace,
        key: &'a CacheKey,
    ) -> CacheFuture<'a, Option<ResultPage>> {
        Box::pin(async move { self.lookup(namespace, key) })
    }

    fn generation(&self, namespace: CacheNamespace) -> CacheFuture<'_, u64> {
        Box::pin(async move {
            self.state
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .generation(namespace)
        })
    }

    fn put(
        &self,
        namespace: CacheNamespace,
        key: CacheKey,
        page: ResultPage,
        generation: u64,
    ) -> CacheFuture<'_, ()> {
        Box::pin(async move { self.store(namespace, key, page, generation) })
    }

    fn invalidate_all(&self, namespace: CacheNamespace) -> CacheFuture<'_, ()> {
        Box::pin(async move { self.evict_namespace(namespace) })
    }
}
