//! # Listings Core
//!
//! Core types and pure logic for the vehicle listings catalog.
//!
//! The catalog is mutated only through change events read from a message bus
//! and is read through paginated, filtered queries. This crate holds everything
//! that does not perform I/O, plus the traits behind which I/O is injected.
//!
//! ## Modules
//!
//! - [`listing`]: the `Listing` document, its enums and addressable fields
//! - [`event`]: the `ChangeEvent` wire type
//! - [`validation`]: business rules a change must satisfy
//! - [`merge`]: field-level merge of an update onto a stored listing
//! - [`query`]: search criteria, filters and pagination
//! - [`store`]: the `ListingStore` persistence trait
//! - [`cache`]: the `ListingCache` read-side cache trait
//! - [`event_bus`]: the `EventBus` transport trait and `Delivery` settlement
//! - [`environment`]: injected dependencies (`Clock`)
//!
//! ## Example
//!
//! ```
//! use listings_core::event::ChangeEvent;
//! use listings_core::validation::{validate, Change, Violation};
//!
//! let event = ChangeEvent::decode(br#"{"id":"42","mode":"DELETE"}"#).unwrap();
//! let change = validate(&event, event.mode, 2026).unwrap();
//! assert!(matches!(change, Change::Delete { ref id } if id == "42"));
//!
//! let event = ChangeEvent::decode(br#"{"make":"Ford"}"#).unwrap();
//! assert_eq!(validate(&event, event.mode, 2026), Err(Violation::ModeRequired));
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, NaiveDate, Utc};
pub use serde::{Deserialize, Serialize};

pub mod cache;
pub mod event;
pub mod event_bus;
pub mod listing;
pub mod merge;
pub mod query;
pub mod store;
pub mod validation;

/// Environment module - Dependency injection traits
///
/// External dependencies that would make the reconciler non-deterministic are
/// abstracted behind traits and injected at construction time.
pub mod environment {
    use chrono::{DateTime, Datelike, NaiveDate, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use listings_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// assert!(clock.current_year() >= 2024);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;

        /// Current calendar date (UTC)
        fn today(&self) -> NaiveDate {
            self.now().date_naive()
        }

        /// Current calendar year (UTC)
        fn current_year(&self) -> i32 {
            self.now().year()
        }
    }

    /// Production clock backed by the system time.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::environment::Clock;
    use chrono::{DateTime, TimeZone, Utc};

    struct Frozen(DateTime<Utc>);

    impl Clock for Frozen {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn clock_derives_date_and_year() {
        let clock = Frozen(Utc.with_ymd_and_hms(2026, 10, 19, 23, 59, 0).unwrap());
        assert_eq!(clock.today().to_string(), "2026-10-19");
        assert_eq!(clock.current_year(), 2026);
    }
}
