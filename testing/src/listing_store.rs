//! In-memory listing store for tests
//!
//! [`InMemoryListingStore`] implements [`ListingStore`] over a `HashMap` with the
//! same filter, sort and pagination semantics as the Postgres adapter, and adds
//! per-operation call counters and failure injection.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Panics only on poisoned locks

use listings_core::listing::Listing;
use listings_core::query::{Filter, Page, PageRequest, SearchQuery};
use listings_core::store::{ListingStore, StoreError, StoreFuture};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Store operation, used to read call counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `exists_by_id`
    ExistsById,
    /// `find_by_id`
    FindById,
    /// `save`
    Save,
    /// `delete_by_id`
    DeleteById,
    /// `find_all`
    FindAll,
    /// `search`
    Search,
}

#[derive(Debug, Default)]
struct Counters {
    exists_by_id: AtomicUsize,
    find_by_id: AtomicUsize,
    save: AtomicUsize,
    delete_by_id: AtomicUsize,
    find_all: AtomicUsize,
    search: AtomicUsize,
}

impl Counters {
    const fn slot(&self, op: StoreOp) -> &AtomicUsize {
        match op {
            StoreOp::ExistsById => &self.exists_by_id,
            StoreOp::FindById => &self.find_by_id,
            StoreOp::Save => &self.save,
            StoreOp::DeleteById => &self.delete_by_id,
            StoreOp::FindAll => &self.find_all,
            StoreOp::Search => &self.search,
        }
    }
}

/// In-memory listing store for fast, deterministic testing.
///
/// Clones share the same data, so a test can keep a handle for assertions
/// while the reconciler owns another.
///
/// # Example
///
/// ```
/// use listings_testing::{InMemoryListingStore, StoreOp, sample_listing};
/// use listings_core::store::ListingStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryListingStore::new();
/// let saved = store.save(sample_listing()).await?;
///
/// assert!(saved.id.is_some());
/// assert_eq!(store.calls(StoreOp::Save), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryListingStore {
    data: Arc<RwLock<HashMap<String, Listing>>>,
    counters: Arc<Counters>,
    failure: Arc<RwLock<Option<StoreError>>>,
}

impl InMemoryListingStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with listings.
    ///
    /// Listings must carry an id.
    #[must_use]
    pub fn with_listings(listings: impl IntoIterator<Item = Listing>) -> Self {
        let store = Self::new();
        {
            let mut data = store.data.write().unwrap();
            for listing in listings {
                let id = listing.id.clone().unwrap();
                data.insert(id, listing);
            }
        }
        store
    }

    /// Make every subsequent operation fail with `error` (`None` heals the store).
    pub fn set_failure(&self, error: Option<StoreError>) {
        *self.failure.write().unwrap() = error;
    }

    /// Number of times `op` has been invoked, including failed calls.
    #[must_use]
    pub fn calls(&self, op: StoreOp) -> usize {
        self.counters.slot(op).load(Ordering::SeqCst)
    }

    /// Total number of store calls of any kind.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        [
            StoreOp::ExistsById,
            StoreOp::FindById,
            StoreOp::Save,
            StoreOp::DeleteById,
            StoreOp::FindAll,
            StoreOp::Search,
        ]
        .into_iter()
        .map(|op| self.calls(op))
        .sum()
    }

    /// Stored listing by id, bypassing counters.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Listing> {
        self.data.read().unwrap().get(id).cloned()
    }

    /// Every stored listing, bypassing counters.
    #[must_use]
    pub fn all(&self) -> Vec<Listing> {
        self.data.read().unwrap().values().cloned().collect()
    }

    /// Number of stored listings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().unwrap().len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().unwrap().is_empty()
    }

    fn enter(&self, op: StoreOp) -> Result<(), StoreError> {
        self.counters.slot(op).fetch_add(1, Ordering::SeqCst);
        self.failure.read().unwrap().clone().map_or(Ok(()), Err)
    }

    fn page(&self, filter: &Filter, request: PageRequest) -> Page<Listing> {
        let mut matching: Vec<Listing> = self
            .data
            .read()
            .unwrap()
            .values()
            .filter(|listing| filter.matches(listing))
            .cloned()
            .collect();

        matching.sort_by(|a, b| {
            request
                .direction
                .apply(request.sort.compare(a, b))
                .then_with(|| a.id.cmp(&b.id))
        });

        let total_elements = matching.len() as u64;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let content = matching
            .into_iter()
            .skip(offset)
            .take(request.size as usize)
            .collect();

        Page::new(content, total_elements)
    }
}

impl ListingStore for InMemoryListingStore {
    fn exists_by_id<'a>(&'a self, id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            self.enter(StoreOp::ExistsById)?;
            Ok(self.data.read().unwrap().contains_key(id))
        })
    }

    fn find_by_id<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Listing>> {
        Box::pin(async move {
            self.enter(StoreOp::FindById)?;
            Ok(self.data.read().unwrap().get(id).cloned())
        })
    }

    fn save(&self, mut listing: Listing) -> StoreFuture<'_, Listing> {
        Box::pin(async move {
            self.enter(StoreOp::Save)?;
            let id = listing
                .id
                .take()
                .filter(|id| !id.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            listing.id = Some(id.clone());
            self.data.write().unwrap().insert(id, listing.clone());
            Ok(listing)
        })
    }

    fn delete_by_id<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            self.enter(StoreOp::DeleteById)?;
            self.data.write().unwrap().remove(id);
            Ok(())
        })
    }

    fn find_all(&self, page_request: PageRequest) -> StoreFuture<'_, Page<Listing>> {
        Box::pin(async move {
            self.enter(StoreOp::FindAll)?;
            Ok(self.page(&Filter::match_all(), page_request))
        })
    }

    fn search<'a>(&'a self, query: &'a SearchQuery) -> StoreFuture<'a, Page<Listing>> {
        Box::pin(async move {
            self.enter(StoreOp::Search)?;
            Ok(self.page(&query.filter, query.page_request))
        })
    }
}
