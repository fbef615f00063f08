//! Integration tests for change event reconciliation against in-memory fakes

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect
#![allow(clippy::panic)] // Tests can panic

use chrono::{Duration as ChronoDuration, NaiveDate};
use listings_core::cache::CacheNamespace;
use listings_core::environment::Clock;
use listings_core::event::{ChangeEvent, ChangeMode};
use listings_core::event_bus::Acknowledgement;
use listings_core::listing::{Listing, ListingField, SortDirection};
use listings_core::query::{Page, PageRequest, SearchCriteria, SearchQuery};
use listings_core::store::{ListingStore, StoreError, StoreFuture};
use listings_core::validation::Violation;
use listings_runtime::{CatalogService, Reconciler, Reconciliation};
use listings_testing::{
    FixedClock, InMemoryListingStore, RecordingCache, StoreOp, create_event, delete_event,
    event_for, listing_with, payload, test_clock, update_event,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct Harness {
    store: InMemoryListingStore,
    cache: RecordingCache,
    clock: FixedClock,
    reconciler: Reconciler,
}

impl Harness {
    fn new() -> Self {
        Self::with_store(InMemoryListingStore::new())
    }

    fn with_store(store: InMemoryListingStore) -> Self {
        let cache = RecordingCache::new();
        let clock = test_clock();
        let reconciler = Reconciler::new(
            Arc::new(store.clone()),
            Arc::new(cache.clone()),
            Arc::new(clock.clone()),
        );
        Self {
            store,
            cache,
            clock,
            reconciler,
        }
    }

    async fn reconcile(&self, event: &ChangeEvent) -> Reconciliation {
        self.reconciler.reconcile(&payload(event)).await
    }

    fn invalidations(&self) -> (usize, usize) {
        (
            self.cache.invalidations(CacheNamespace::AllListings),
            self.cache.invalidations(CacheNamespace::SearchListings),
        )
    }
}

fn current_year() -> i32 {
    test_clock().current_year()
}

#[tokio::test]
async fn missing_mode_is_acknowledged_without_store_calls() {
    let harness = Harness::new();
    let mut event = create_event();
    event.mode = None;

    let result = harness.reconcile(&event).await;

    assert_eq!(result, Reconciliation::Rejected(Violation::ModeRequired));
    assert_eq!(harness.reconciler.acknowledgement(&result), Acknowledgement::Ack);
    assert_eq!(harness.store.total_calls(), 0);
    assert_eq!(harness.invalidations(), (0, 0));
}

#[tokio::test]
async fn malformed_payloads_are_acknowledged_without_store_calls() {
    let harness = Harness::new();

    let bodies: [&[u8]; 5] = [
        b"",
        b"not json",
        br#"{"mode":"CREATE","colour":"red"}"#,
        br#"{"mode":"REPLACE"}"#,
        br#"{"mode":"CREATE","fuelType":"STEAM"}"#,
    ];
    for body in bodies {
        let result = harness.reconciler.reconcile(body).await;
        assert!(matches!(result, Reconciliation::Malformed(_)), "{result:?}");
        assert_eq!(harness.reconciler.acknowledgement(&result), Acknowledgement::Ack);
    }
    assert_eq!(harness.store.total_calls(), 0);
}

#[tokio::test]
async fn valid_create_sets_creation_date_only() {
    let harness = Harness::new();

    let result = harness.reconcile(&create_event()).await;

    let Reconciliation::Applied { mode: ChangeMode::Create, id } = result else {
        panic!("expected applied create");
    };
    let stored = harness.store.get(&id).unwrap();
    assert_eq!(stored.date_created, Some(harness.clock.today()));
    assert_eq!(stored.date_updated, None);
    assert_eq!(stored.make, "Toyota");
    assert_eq!(harness.invalidations(), (1, 1));
}

#[tokio::test]
async fn valid_update_preserves_creation_date_and_copies_fields() {
    let mut existing = listing_with("Honda", "Civic", 2010, 150_000).with_id("car-1");
    existing.date_created = NaiveDate::from_ymd_opt(2025, 6, 1);
    let harness = Harness::with_store(InMemoryListingStore::with_listings([existing]));
    harness.clock.advance(ChronoDuration::days(3));

    let event = update_event("car-1");
    let result = harness.reconcile(&event).await;

    assert_eq!(
        result,
        Reconciliation::Applied {
            mode: ChangeMode::Update,
            id: "car-1".into()
        }
    );
    let stored = harness.store.get("car-1").unwrap();
    assert_eq!(stored.id.as_deref(), Some("car-1"));
    assert_eq!(stored.date_created, NaiveDate::from_ymd_opt(2025, 6, 1));
    assert_eq!(stored.date_updated, Some(harness.clock.today()));
    assert_eq!(Some(stored.make), event.make);
    assert_eq!(Some(stored.model), event.model);
    assert_eq!(Some(stored.production_year), event.production_year);
    assert_eq!(Some(stored.mileage), event.mileage);
    assert_eq!(Some(stored.transmission_type), event.transmission_type);
    assert_eq!(Some(stored.fuel_type), event.fuel_type);
    assert_eq!(
        Some(stored.contact_info.email),
        event.contact_info.unwrap().email
    );
    assert_eq!(harness.invalidations(), (1, 1));
}

#[tokio::test]
async fn delete_of_missing_listing_is_a_no_op() {
    let harness = Harness::new();

    let result = harness.reconcile(&delete_event("ghost")).await;

    assert_eq!(
        result,
        Reconciliation::TargetMissing {
            mode: ChangeMode::Delete,
            id: "ghost".into()
        }
    );
    assert_eq!(harness.reconciler.acknowledgement(&result), Acknowledgement::Ack);
    assert_eq!(harness.store.calls(StoreOp::ExistsById), 1);
    assert_eq!(harness.store.calls(StoreOp::DeleteById), 0);
    assert_eq!(harness.invalidations(), (0, 0));
}

#[tokio::test]
async fn update_of_missing_listing_is_a_no_op() {
    let harness = Harness::new();

    let result = harness.reconcile(&update_event("ghost")).await;

    assert!(matches!(
        result,
        Reconciliation::TargetMissing {
            mode: ChangeMode::Update,
            ..
        }
    ));
    assert_eq!(harness.reconciler.acknowledgement(&result), Acknowledgement::Ack);
    assert_eq!(harness.store.calls(StoreOp::Save), 0);
    assert_eq!(harness.invalidations(), (0, 0));
}

#[tokio::test]
async fn delete_of_existing_listing_removes_it() {
    let harness = Harness::with_store(InMemoryListingStore::with_listings([
        listing_with("Mazda", "3", 2016, 80_000).with_id("m3"),
    ]));

    let result = harness.reconcile(&delete_event("m3")).await;

    assert!(matches!(result, Reconciliation::Applied { .. }));
    assert!(harness.store.is_empty());
    assert_eq!(harness.invalidations(), (1, 1));

    // Redelivery of the same DELETE is harmless.
    let again = harness.reconcile(&delete_event("m3")).await;
    assert!(matches!(again, Reconciliation::TargetMissing { .. }));
    assert_eq!(harness.store.calls(StoreOp::DeleteById), 1);
}

#[tokio::test]
async fn production_year_bounds() {
    let harness = Harness::new();
    let year = current_year();

    let mut event = create_event();
    event.production_year = Some(1899);
    assert_eq!(
        harness.reconcile(&event).await,
        Reconciliation::Rejected(Violation::ProductionYearTooEarly(1899))
    );

    event.production_year = Some(year + 1);
    assert!(matches!(
        harness.reconcile(&event).await,
        Reconciliation::Rejected(Violation::ProductionYearInFuture { .. })
    ));
    assert_eq!(harness.store.total_calls(), 0);

    event.production_year = Some(year);
    assert!(matches!(
        harness.reconcile(&event).await,
        Reconciliation::Applied { .. }
    ));
}

#[tokio::test]
async fn mileage_bounds() {
    let harness = Harness::new();

    let mut event = create_event();
    event.mileage = Some(-1);
    assert_eq!(
        harness.reconcile(&event).await,
        Reconciliation::Rejected(Violation::NegativeMileage(-1))
    );

    event.mileage = Some(0);
    assert!(matches!(
        harness.reconcile(&event).await,
        Reconciliation::Applied { .. }
    ));
}

#[tokio::test]
async fn store_failures_are_retried_with_fixed_delay() {
    let harness = Harness::new();
    harness
        .store
        .set_failure(Some(StoreError::Unavailable("connection refused".into())));

    for event in [create_event(), update_event("x"), delete_event("x")] {
        let result = harness.reconcile(&event).await;
        assert!(matches!(result, Reconciliation::Failed(_)));
        assert_eq!(
            harness.reconciler.acknowledgement(&result),
            Acknowledgement::Retry(Duration::from_millis(5))
        );
    }
    assert_eq!(harness.invalidations(), (0, 0));
}

#[tokio::test]
async fn duplicate_create_is_not_deduplicated() {
    let harness = Harness::new();

    harness.reconcile(&create_event()).await;
    harness.reconcile(&create_event()).await;

    assert_eq!(harness.store.len(), 2);
}

#[tokio::test]
async fn create_onto_stored_id_keeps_creation_date() {
    let mut existing = listing_with("Honda", "Civic", 2010, 150_000).with_id("car-1");
    existing.date_created = NaiveDate::from_ymd_opt(2025, 6, 1);
    let harness = Harness::with_store(InMemoryListingStore::with_listings([existing]));

    let mut event = create_event();
    event.id = Some("car-1".to_string());
    let result = harness.reconcile(&event).await;

    assert_eq!(
        result,
        Reconciliation::Applied {
            mode: ChangeMode::Create,
            id: "car-1".to_string(),
        }
    );
    let stored = harness.store.get("car-1").unwrap();
    assert_eq!(stored.date_created, NaiveDate::from_ymd_opt(2025, 6, 1));
    assert_eq!(stored.date_updated, Some(harness.clock.today()));
    assert_eq!(stored.make, "Toyota");
    assert_eq!(harness.store.len(), 1);
}

#[tokio::test]
async fn create_with_unknown_id_is_stamped_as_new() {
    let harness = Harness::new();

    let mut event = create_event();
    event.id = Some("car-9".to_string());
    harness.reconcile(&event).await;

    let stored = harness.store.get("car-9").unwrap();
    assert_eq!(stored.date_created, Some(harness.clock.today()));
    assert_eq!(stored.date_updated, None);
}

#[tokio::test]
async fn each_mutation_invalidates_both_namespaces_once() {
    let harness = Harness::new();

    let Reconciliation::Applied { id, .. } = harness.reconcile(&create_event()).await else {
        panic!("create should apply");
    };
    assert_eq!(harness.invalidations(), (1, 1));

    harness.reconcile(&update_event(&id)).await;
    assert_eq!(harness.invalidations(), (2, 2));

    harness.reconcile(&delete_event(&id)).await;
    assert_eq!(harness.invalidations(), (3, 3));
}

#[tokio::test]
async fn reads_after_a_mutation_see_the_new_state() {
    let harness = Harness::new();
    let catalog = CatalogService::new(
        Arc::new(harness.store.clone()),
        Arc::new(harness.cache.clone()),
    );
    let request = PageRequest::new(0, 10, ListingField::Make, SortDirection::Asc);
    let criteria = SearchCriteria::new()
        .term(ListingField::Make, "Toyota")
        .term(ListingField::Model, "Camry");

    assert_eq!(catalog.get_all(request).await.unwrap().total_elements, 0);
    assert_eq!(catalog.search(&criteria, request).await.unwrap().total_elements, 0);

    harness.reconcile(&create_event()).await;
    let corolla = event_for(
        &listing_with("Toyota", "Corolla", 2020, 1_000),
        ChangeMode::Create,
    );
    harness.reconcile(&corolla).await;

    let all = catalog.get_all(request).await.unwrap();
    assert_eq!(all.total_elements, 2);
    assert_eq!(all.total_pages, 1);

    let found = catalog.search(&criteria, request).await.unwrap();
    assert_eq!(found.total_elements, 1);
    assert!(
        found
            .content
            .iter()
            .all(|l| l.make == "Toyota" && l.model == "Camry")
    );
}

/// Store whose next read is followed by a reconciled write, before the
/// reader gets the page back.
struct WriteAfterRead {
    inner: InMemoryListingStore,
    reconciler: Arc<Reconciler>,
    pending: Mutex<Option<ChangeEvent>>,
}

impl WriteAfterRead {
    async fn interleave(&self) {
        let pending = self.pending.lock().unwrap().take();
        if let Some(event) = pending {
            let result = self.reconciler.reconcile(&payload(&event)).await;
            assert!(result.changed_state(), "{result:?}");
        }
    }
}

impl ListingStore for WriteAfterRead {
    fn exists_by_id<'a>(&'a self, id: &'a str) -> StoreFuture<'a, bool> {
        self.inner.exists_by_id(id)
    }

    fn find_by_id<'a>(&'a self, id: &'a str) -> StoreFuture<'a, Option<Listing>> {
        self.inner.find_by_id(id)
    }

    fn save(&self, listing: Listing) -> StoreFuture<'_, Listing> {
        self.inner.save(listing)
    }

    fn delete_by_id<'a>(&'a self, id: &'a str) -> StoreFuture<'a, ()> {
        self.inner.delete_by_id(id)
    }

    fn find_all(&self, page_request: PageRequest) -> StoreFuture<'_, Page<Listing>> {
        Box::pin(async move {
            let page = self.inner.find_all(page_request).await?;
            self.interleave().await;
            Ok(page)
        })
    }

    fn search<'a>(&'a self, query: &'a SearchQuery) -> StoreFuture<'a, Page<Listing>> {
        Box::pin(async move {
            let page = self.inner.search(query).await?;
            self.interleave().await;
            Ok(page)
        })
    }
}

#[tokio::test]
async fn pages_read_before_a_write_are_not_cached() {
    let harness = Harness::new();
    let store = Arc::new(WriteAfterRead {
        inner: harness.store.clone(),
        reconciler: Arc::new(Reconciler::new(
            Arc::new(harness.store.clone()),
            Arc::new(harness.cache.clone()),
            Arc::new(harness.clock.clone()),
        )),
        pending: Mutex::new(Some(create_event())),
    });
    let catalog = CatalogService::new(store.clone(), Arc::new(harness.cache.clone()));
    let request = PageRequest::new(0, 10, ListingField::Make, SortDirection::Asc);

    let first = catalog.get_all(request).await.unwrap();
    assert_eq!(first.total_elements, 0);
    assert_eq!(harness.store.len(), 1);
    assert_eq!(harness.cache.stale_puts(), 1);

    let second = catalog.get_all(request).await.unwrap();
    assert_eq!(second.total_elements, 1);

    // Same race on the search namespace
    *store.pending.lock().unwrap() = Some(event_for(
        &listing_with("Toyota", "Corolla", 2020, 1_000),
        ChangeMode::Create,
    ));
    let criteria = SearchCriteria::new().term(ListingField::Make, "Toyota");
    assert_eq!(catalog.search(&criteria, request).await.unwrap().total_elements, 1);
    assert_eq!(catalog.search(&criteria, request).await.unwrap().total_elements, 2);
}
