//! # Listings Testing
//!
//! Testing utilities for the listings catalog.
//!
//! This crate provides:
//! - In-memory implementations of the store, cache and event bus traits
//! - A controllable clock
//! - Fixtures for listings and change events
//! - proptest strategies for domain types
//!
//! ## Example
//!
//! ```
//! use listings_testing::{InMemoryListingStore, create_event, test_clock};
//! use listings_core::environment::Clock;
//!
//! let store = InMemoryListingStore::new();
//! let event = create_event();
//! let clock = test_clock();
//!
//! assert!(store.is_empty());
//! assert_eq!(event.make.as_deref(), Some("Toyota"));
//! assert_eq!(clock.current_year(), 2026);
//! ```

use chrono::{DateTime, Utc};
use listings_core::environment::Clock;

pub mod cache;
pub mod event_bus;
pub mod listing_store;

/// Mock implementations of Environment traits
pub mod mocks {
    #![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
    #![allow(clippy::missing_panics_doc)]

    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, RwLock};

    /// Fixed clock for deterministic tests
    ///
    /// Returns the same time until moved with [`FixedClock::set`] or
    /// [`FixedClock::advance`]. Clones share the same time.
    ///
    /// # Example
    ///
    /// ```
    /// use listings_testing::mocks::FixedClock;
    /// use listings_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock to `time`
        pub fn set(&self, time: DateTime<Utc>) {
            *self.time.write().unwrap() = time;
        }

        /// Move the clock forward
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.write().unwrap();
            *time += by;
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.read().unwrap()
        }
    }

    /// Create a default fixed clock for tests (2026-03-15 10:30:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2026-03-15T10:30:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Fixtures for listings and change events
pub mod helpers {
    use listings_core::event::{ChangeEvent, ChangeMode, EventContactInfo};
    use listings_core::listing::{ContactInfo, FuelType, Listing, TransmissionType};

    /// A complete, valid listing without an id.
    #[must_use]
    pub fn sample_listing() -> Listing {
        listing_with("Toyota", "Camry", 2019, 42_000)
    }

    /// A complete, valid listing with the given make, model, year and mileage.
    #[must_use]
    pub fn listing_with(make: &str, model: &str, production_year: i32, mileage: i64) -> Listing {
        Listing::new(
            make,
            model,
            production_year,
            mileage,
            TransmissionType::Automatic,
            FuelType::Hybrid,
            ContactInfo::new("Emma", "Jones", "emma.jones@example.com", "+15551234567"),
        )
    }

    /// The change event that would carry `listing` with `mode`.
    #[must_use]
    pub fn event_for(listing: &Listing, mode: ChangeMode) -> ChangeEvent {
        ChangeEvent {
            id: listing.id.clone(),
            make: Some(listing.make.clone()),
            model: Some(listing.model.clone()),
            production_year: Some(listing.production_year),
            mileage: Some(listing.mileage),
            transmission_type: Some(listing.transmission_type),
            fuel_type: Some(listing.fuel_type),
            contact_info: Some(EventContactInfo {
                first_name: Some(listing.contact_info.first_name.clone()),
                last_name: Some(listing.contact_info.last_name.clone()),
                email: Some(listing.contact_info.email.clone()),
                phone_number: Some(listing.contact_info.phone_number.clone()),
            }),
            mode: Some(mode),
        }
    }

    /// A valid CREATE event for [`sample_listing`].
    #[must_use]
    pub fn create_event() -> ChangeEvent {
        event_for(&sample_listing(), ChangeMode::Create)
    }

    /// A valid UPDATE event targeting `id`.
    #[must_use]
    pub fn update_event(id: &str) -> ChangeEvent {
        let listing = listing_with("Toyota", "Corolla", 2021, 12_500).with_id(id);
        event_for(&listing, ChangeMode::Update)
    }

    /// A DELETE event targeting `id`.
    #[must_use]
    pub fn delete_event(id: &str) -> ChangeEvent {
        ChangeEvent {
            id: Some(id.to_string()),
            mode: Some(ChangeMode::Delete),
            ..ChangeEvent::default()
        }
    }

    /// JSON payload of an event, as it would appear on the wire.
    ///
    /// # Panics
    ///
    /// Panics if the event cannot be encoded, which cannot happen for this type.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn payload(event: &ChangeEvent) -> Vec<u8> {
        event.encode().expect("change events always encode")
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use listings_core::listing::{ContactInfo, FuelType, Listing, TransmissionType};
    use listings_core::validation::MIN_PRODUCTION_YEAR;
    use proptest::prelude::*;

    /// Any transmission type.
    pub fn transmission_type() -> impl Strategy<Value = TransmissionType> {
        prop_oneof![
            Just(TransmissionType::Manual),
            Just(TransmissionType::Automatic),
            Just(TransmissionType::SemiAutomatic),
        ]
    }

    /// Any fuel type.
    pub fn fuel_type() -> impl Strategy<Value = FuelType> {
        prop_oneof![
            Just(FuelType::Petrol),
            Just(FuelType::Diesel),
            Just(FuelType::Electric),
            Just(FuelType::Hybrid),
            Just(FuelType::Lpg),
        ]
    }

    /// Complete contact details with non-blank fields.
    pub fn contact_info() -> impl Strategy<Value = ContactInfo> {
        (
            "[A-Z][a-z]{1,10}",
            "[A-Z][a-z]{1,12}",
            "[a-z]{1,8}@[a-z]{1,8}\\.com",
            "\\+1555[0-9]{7}",
        )
            .prop_map(|(first, last, email, phone)| ContactInfo::new(first, last, email, phone))
    }

    /// A listing without an id that satisfies every business rule for `current_year`.
    pub fn valid_listing(current_year: i32) -> impl Strategy<Value = Listing> {
        (
            "[A-Z][a-z]{1,10}",
            "[A-Z0-9][a-z0-9]{0,10}",
            MIN_PRODUCTION_YEAR..=current_year,
            0i64..1_000_000,
            transmission_type(),
            fuel_type(),
            contact_info(),
        )
            .prop_map(|(make, model, year, mileage, transmission, fuel, contact)| {
                Listing::new(make, model, year, mileage, transmission, fuel, contact)
            })
    }
}

// Re-export commonly used items
pub use cache::RecordingCache;
pub use event_bus::{InMemoryEventBus, Record, Settled};
pub use helpers::{
    create_event, delete_event, event_for, listing_with, payload, sample_listing, update_event,
};
pub use listing_store::{InMemoryListingStore, StoreOp};
pub use mocks::{FixedClock, test_clock};
