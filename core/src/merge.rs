//! Field-level merge of an update onto a stored listing.

use crate::listing::Listing;
use chrono::NaiveDate;

/// Apply the mutable fields of `incoming` onto `existing`.
///
/// Make, model, production year, mileage, transmission, fuel and the whole
/// contact info block are taken from `incoming`. The stored identity and
/// creation date are always kept, and `date_updated` is set to `today`.
#[must_use]
pub fn merge(existing: Listing, incoming: Listing, today: NaiveDate) -> Listing {
    Listing {
        id: existing.id,
        make: incoming.make,
        model: incoming.model,
        production_year: incoming.production_year,
        mileage: incoming.mileage,
        transmission_type: incoming.transmission_type,
        fuel_type: incoming.fuel_type,
        contact_info: incoming.contact_info,
        date_created: existing.date_created,
        date_updated: Some(today),
    }
}
