//! Persistence abstraction for listings.
//!
//! The [`ListingStore`] trait is the only path from the catalog to durable
//! state. The reconciler uses the single-record operations; the read side uses
//! [`ListingStore::find_all`] and [`ListingStore::search`].
//!
//! # Implementations
//!
//! - `PostgresListingStore` (listings-postgres) - JSONB documents in Postgres
//! - `InMemoryListingStore` (listings-testing) - for tests, with failure injection
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` so the store can be shared as
//! `Arc<dyn ListingStore>` between reconciler workers and the read path.

use crate::listing::Listing;
use crate::query::{Page, PageRequest, SearchQuery};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors returned by a listing store.
///
/// Every variant is treated as transient by the reconciler: the event is
/// retried rather than dropped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// The store rejected or failed to execute a query
    #[error("Query failed: {0}")]
    Query(String),

    /// A stored document could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Boxed future returned by [`ListingStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Durable listing storage.
///
/// A successful [`save`](ListingStore::save) must be visible to the next read
/// issued after it returns.
pub trait ListingStore: Send + Sync {
    /// Whether a listing with this id exists.
    fn exists_by_id<'a>(&'a self, id: &'a str) -> StoreFuture<'a, bool>;

    /// Fetch a listing by id.
    fn find_by_id<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Listing>>;

    /// Insert or replace a listing, returning it as stored.
    ///
    /// A listing without an id is assigned a fresh one.
    fn save(&self, listing: Listing) -> StoreFuture<'_, Listing>;

    /// Remove a listing. Removing an absent id is not an error.
    fn delete_by_id<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()>;

    /// One page of all listings.
    fn find_all(&self, page_request: PageRequest) -> StoreFuture<'_, Page<Listing>>;

    /// One page of the listings matching the query filter.
    fn search<'a>(&'a self, query: &'a SearchQuery) -> StoreFuture<'a, Page<Listing>>;
}
