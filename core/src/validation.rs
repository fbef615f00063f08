//! Business-rule validation of change events.
//!
//! [`validate`] checks a candidate event against the rules of its mode and, when
//! every rule holds, turns it into a [`Change`] whose variants carry exactly the
//! data the mode needs. Rules are checked in a fixed order and the first one that
//! fails is reported.
//!
//! The function is pure: the current year is passed in rather than read from the
//! system clock.

use crate::event::{ChangeEvent, ChangeMode, EventContactInfo};
use crate::listing::{ContactInfo, Listing};
use thiserror::Error;

/// Earliest production year accepted.
pub const MIN_PRODUCTION_YEAR: i32 = 1900;

/// A validated change, ready to be applied to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Change {
    /// Persist a new listing.
    Create(Listing),
    /// Replace the mutable fields of listing `id` with those of `listing`.
    Update {
        /// Target listing
        id: String,
        /// Incoming values
        listing: Listing,
    },
    /// Remove listing `id`.
    Delete {
        /// Target listing
        id: String,
    },
}

impl Change {
    /// Mode this change was validated for.
    #[must_use]
    pub const fn mode(&self) -> ChangeMode {
        match self {
            Self::Create(_) => ChangeMode::Create,
            Self::Update { .. } => ChangeMode::Update,
            Self::Delete { .. } => ChangeMode::Delete,
        }
    }
}

/// The first business rule a candidate event violates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    /// No mode on the event
    #[error("mode required")]
    ModeRequired,

    /// UPDATE or DELETE without a target id
    #[error("id required for {0} mode")]
    IdRequired(ChangeMode),

    /// Blank or missing make
    #[error("make required")]
    MakeRequired,

    /// Blank or missing model
    #[error("model required")]
    ModelRequired,

    /// Missing production year
    #[error("production year required")]
    ProductionYearRequired,

    /// Production year before 1900
    #[error("production year {0} is before 1900")]
    ProductionYearTooEarly(i32),

    /// Production year after the current year
    #[error("production year {year} is after the current year {current_year}")]
    ProductionYearInFuture {
        /// Provided year
        year: i32,
        /// Year at validation time
        current_year: i32,
    },

    /// Missing mileage
    #[error("mileage required")]
    MileageRequired,

    /// Negative mileage
    #[error("mileage {0} is negative")]
    NegativeMileage(i64),

    /// Missing transmission type
    #[error("transmission type required")]
    TransmissionTypeRequired,

    /// Missing fuel type
    #[error("fuel type required")]
    FuelTypeRequired,

    /// Missing contact info
    #[error("contact info required")]
    ContactInfoRequired,

    /// Blank or missing contact first name
    #[error("contact info first name required")]
    ContactFirstNameRequired,

    /// Blank or missing contact last name
    #[error("contact info last name required")]
    ContactLastNameRequired,

    /// Blank or missing contact email
    #[error("contact info email required")]
    ContactEmailRequired,

    /// Blank or missing contact phone number
    #[error("contact info phone number required")]
    ContactPhoneNumberRequired,
}

fn text(value: Option<&String>, violation: Violation) -> Result<String, Violation> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value.clone()),
        _ => Err(violation),
    }
}

fn contact_info(contact: Option<&EventContactInfo>) -> Result<ContactInfo, Violation> {
    let contact = contact.ok_or(Violation::ContactInfoRequired)?;
    Ok(ContactInfo {
        first_name: text(contact.first_name.as_ref(), Violation::ContactFirstNameRequired)?,
        last_name: text(contact.last_name.as_ref(), Violation::ContactLastNameRequired)?,
        email: text(contact.email.as_ref(), Violation::ContactEmailRequired)?,
        phone_number: text(contact.phone_number.as_ref(), Violation::ContactPhoneNumberRequired)?,
    })
}

fn listing_fields(candidate: &ChangeEvent, current_year: i32) -> Result<Listing, Violation> {
    let make = text(candidate.make.as_ref(), Violation::MakeRequired)?;
    let model = text(candidate.model.as_ref(), Violation::ModelRequired)?;

    let production_year = candidate
        .production_year
        .ok_or(Violation::ProductionYearRequired)?;
    if production_year < MIN_PRODUCTION_YEAR {
        return Err(Violation::ProductionYearTooEarly(production_year));
    }
    if production_year > current_year {
        return Err(Violation::ProductionYearInFuture {
            year: production_year,
            current_year,
        });
    }

    let mileage = candidate.mileage.ok_or(Violation::MileageRequired)?;
    if mileage < 0 {
        return Err(Violation::NegativeMileage(mileage));
    }

    let transmission_type = candidate
        .transmission_type
        .ok_or(Violation::TransmissionTypeRequired)?;
    let fuel_type = candidate.fuel_type.ok_or(Violation::FuelTypeRequired)?;
    let contact_info = contact_info(candidate.contact_info.as_ref())?;

    Ok(Listing {
        id: candidate.listing_id().map(str::to_string),
        make,
        model,
        production_year,
        mileage,
        transmission_type,
        fuel_type,
        contact_info,
        date_created: None,
        date_updated: None,
    })
}

/// Validate a candidate event for `mode`.
///
/// `mode` is passed separately from the candidate so callers can validate a
/// payload against a mode decided elsewhere; the reconciler passes the event's
/// own mode.
///
/// # Errors
///
/// Returns the first [`Violation`] in rule order: mode, id (UPDATE/DELETE), then
/// for CREATE/UPDATE make, model, production year (presence, lower bound, upper
/// bound), mileage (presence, lower bound), transmission type, fuel type,
/// contact info and its four fields. DELETE checks nothing beyond the id.
pub fn validate(
    candidate: &ChangeEvent,
    mode: Option<ChangeMode>,
    current_year: i32,
) -> Result<Change, Violation> {
    let mode = mode.ok_or(Violation::ModeRequired)?;

    match mode {
        ChangeMode::Create => Ok(Change::Create(listing_fields(candidate, current_year)?)),
        ChangeMode::Update => {
            let id = candidate
                .listing_id()
                .ok_or(Violation::IdRequired(mode))?
                .to_string();
            let listing = listing_fields(candidate, current_year)?;
            Ok(Change::Update { id, listing })
        },
        ChangeMode::Delete => {
            let id = candidate
                .listing_id()
                .ok_or(Violation::IdRequired(mode))?
                .to_string();
            Ok(Change::Delete { id })
        },
    }
}
