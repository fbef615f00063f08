//! Read path of the catalog.
//!
//! [`CatalogService`] answers paginated reads with a cache read-through: the
//! cache is consulted first, and a miss goes to the store and fills the cache.
//! Entries stay valid until the reconciler evicts their namespace. A page read
//! from the store while an eviction happens is returned but not cached.

use crate::metrics::CacheMetrics;
use listings_core::cache::{CacheKey, CacheNamespace, ListingCache};
use listings_core::query::{PageRequest, ResultPage, SearchCriteria, build};
use listings_core::store::{ListingStore, StoreError};
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by catalog reads.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// The store failed to answer the query
    #[error("Listing store error: {0}")]
    Store(#[from] StoreError),
}

/// Paginated, cached access to listings.
#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn ListingStore>,
    cache: Arc<dyn ListingCache>,
}

impl CatalogService {
    /// Create a catalog service.
    #[must_use]
    pub fn new(store: Arc<dyn ListingStore>, cache: Arc<dyn ListingCache>) -> Self {
        Self { store, cache }
    }

    /// One page of all listings.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Store`] if the page is not cached and the store fails.
    pub async fn get_all(&self, page_request: PageRequest) -> Result<ResultPage, CatalogError> {
        tracing::info!(
            page = page_request.page,
            size = page_request.size,
            sort = %page_request.sort,
            direction = ?page_request.direction,
            "Fetching listings"
        );

        let namespace = CacheNamespace::AllListings;
        let key = CacheKey::for_page(&page_request);
        if let Some(cached) = self.cached(namespace, &key).await {
            return Ok(cached);
        }

        let generation = self.cache.generation(namespace).await;
        let page = self.store.find_all(page_request).await?;
        let result = ResultPage::from_page(&page_request, page);
        self.cache.put(namespace, key, result.clone(), generation).await;
        Ok(result)
    }

    /// One page of the listings matching every term of `criteria`.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::Store`] if the page is not cached and the store fails.
    pub async fn search(
        &self,
        criteria: &SearchCriteria,
        page_request: PageRequest,
    ) -> Result<ResultPage, CatalogError> {
        let query = build(criteria, page_request);
        tracing::info!(
            filter = %query.filter.explain(),
            page = page_request.page,
            size = page_request.size,
            sort = %page_request.sort,
            direction = ?page_request.direction,
            "Searching listings"
        );

        let namespace = CacheNamespace::SearchListings;
        let key = CacheKey::for_search(criteria, &page_request);
        if let Some(cached) = self.cached(namespace, &key).await {
            return Ok(cached);
        }

        let generation = self.cache.generation(namespace).await;
        let page = self.store.search(&query).await?;
        let result = ResultPage::from_page(&page_request, page);
        self.cache.put(namespace, key, result.clone(), generation).await;
        Ok(result)
    }

    async fn cached(&self, namespace: CacheNamespace, key: &CacheKey) -> Option<ResultPage> {
        let cached = self.cache.get(namespace, key).await;
        if cached.is_some() {
            CacheMetrics::record_hit(namespace);
            tracing::debug!(namespace = %namespace, key = %key, "Cache hit");
        } else {
            CacheMetrics::record_miss(namespace);
        }
        cached
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use listings_core::listing::{ListingField, SortDirection};
    use listings_testing::{InMemoryListingStore, RecordingCache, StoreOp, listing_with};

    fn service(store: &InMemoryListingStore, cache: &RecordingCache) -> CatalogService {
        CatalogService::new(Arc::new(store.clone()), Arc::new(cache.clone()))
    }

    fn request() -> PageRequest {
        PageRequest::new(0, 10, ListingField::Make, SortDirection::Asc)
    }

    #[tokio::test]
    async fn second_read_is_served_from_cache() {
        let store = InMemoryListingStore::with_listings([listing_with("Kia", "Rio", 2017, 5).with_id("1")]);
        let cache = RecordingCache::new();
        let catalog = service(&store, &cache);

        let first = catalog.get_all(request()).await.unwrap();
        let second = catalog.get_all(request()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.calls(StoreOp::FindAll), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[tokio::test]
    async fn store_errors_are_not_cached() {
        let store = InMemoryListingStore::new();
        store.set_failure(Some(StoreError::Query("bad".into())));
        let cache = RecordingCache::new();
        let catalog = service(&store, &cache);

        let err = catalog.get_all(request()).await.unwrap_err();
        assert_eq!(err, CatalogError::Store(StoreError::Query("bad".into())));
        assert_eq!(cache.puts(), 0);
    }
}
