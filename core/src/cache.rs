//! Read-side cache contract.
//!
//! Paginated reads are memoized per [`CacheNamespace`]. Any state-changing
//! reconciliation evicts both namespaces in full, so a cached page is never
//! served after the write that made it stale has been acknowledged.
//!
//! Each namespace carries a generation that every eviction advances. A reader
//! takes the generation before querying the store and hands it back with the
//! page; a page read before an eviction is then discarded instead of cached.

use crate::query::{PageRequest, ResultPage, SearchCriteria};
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Logical partition of cached entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheNamespace {
    /// Results of unfiltered paginated reads
    AllListings,
    /// Results of filtered paginated reads
    SearchListings,
}

impl CacheNamespace {
    /// Every namespace, in eviction order.
    pub const ALL: [Self; 2] = [Self::AllListings, Self::SearchListings];

    /// Namespace name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AllListings => "allListings",
            Self::SearchListings => "searchListings",
        }
    }
}

impl fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of a cached page: the JSON rendering of the request that produced it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Key for an unfiltered read.
    #[must_use]
    pub fn for_page(page_request: &PageRequest) -> Self {
        Self::encode(page_request)
    }

    /// Key for a filtered read.
    #[must_use]
    pub fn for_search(criteria: &SearchCriteria, page_request: &PageRequest) -> Self {
        Self::encode(&(criteria, page_request))
    }

    /// Key rendering.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn encode<T: Serialize>(value: &T) -> Self {
        // Request types contain only strings, integers and unit enums.
        Self(serde_json::to_string(value).unwrap_or_default())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Boxed future returned by [`ListingCache`] methods.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Namespaced cache of result pages.
///
/// Cache failures are never surfaced: a miss is always a safe answer.
pub trait ListingCache: Send + Sync {
    /// Look up a cached page.
    fn get<'a>(
        &'a self,
        namespace: CacheNamespace,
        key: &'a CacheKey,
    ) -> CacheFuture<'a, Option<ResultPage>>;

    /// Current generation of a namespace.
    fn generation(&self, namespace: CacheNamespace) -> CacheFuture<'_, u64>;

    /// Store a page read at `generation`.
    ///
    /// Does nothing if the namespace was evicted since that generation.
    fn put(
        &self,
        namespace: CacheNamespace,
        key: CacheKey,
        page: ResultPage,
        generation: u64,
    ) -> CacheFuture<'_, ()>;

    /// Drop every entry of a namespace and advance its generation.
    fn invalidate_all(&self, namespace: CacheNamespace) -> CacheFuture<'_, ()>;
}
