//! # Listings Runtime
//!
//! Runtime services for the listings catalog.
//!
//! This crate wires the pure logic of `listings-core` to its injected
//! dependencies (store, cache, event bus, clock) and runs it.
//!
//! ## Core Components
//!
//! - **Reconciler**: applies one change event and decides ACK or RETRY
//! - **Worker pool**: consumes the listings topic with one in-flight event per worker
//! - **Catalog**: paginated reads with cache read-through
//! - **Publisher**: producer path for change events
//! - **Cache**: bounded in-memory implementation of the cache trait
//!
//! ## Example
//!
//! ```ignore
//! use listings_runtime::{Reconciler, ReconcilerPool};
//!
//! let reconciler = Arc::new(Reconciler::new(store, cache, Arc::new(SystemClock)));
//! let pool = ReconcilerPool::spawn(4, reconciler, event_bus, "listings");
//!
//! // ...
//! pool.shutdown().await?;
//! ```

/// Bounded in-memory cache of result pages
pub mod cache;

/// Cached, paginated reads
pub mod catalog;

/// Prometheus metrics for observability
pub mod metrics;

/// Change event publishing
pub mod publisher;

/// Change event reconciliation
pub mod reconciler;

/// Workers consuming the listings topic
pub mod worker;

pub use cache::InMemoryListingCache;
pub use catalog::{CatalogError, CatalogService};
pub use publisher::{ListingEventPublisher, PublishError};
pub use reconciler::{DEFAULT_RETRY_DELAY, Reconciler, Reconciliation};
pub use worker::{ReconcilerPool, ReconcilerWorker, WorkerError};
