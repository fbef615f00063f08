//! Listing records and the addressable field enumeration.
//!
//! A [`Listing`] is the document stored in the catalog. Every field a search or a
//! sort may address is named by [`ListingField`], which knows the document path of
//! the field, how to render a listing's value for text matching, and how to order
//! two listings by that field.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Gearbox of a vehicle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransmissionType {
    /// Manual gearbox
    Manual,
    /// Automatic gearbox
    Automatic,
    /// Automated manual / semi-automatic gearbox
    SemiAutomatic,
}

impl TransmissionType {
    /// Wire representation of the transmission type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "MANUAL",
            Self::Automatic => "AUTOMATIC",
            Self::SemiAutomatic => "SEMI_AUTOMATIC",
        }
    }
}

/// Fuel a vehicle runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FuelType {
    /// Petrol / gasoline
    Petrol,
    /// Diesel
    Diesel,
    /// Battery electric
    Electric,
    /// Hybrid drivetrain
    Hybrid,
    /// Liquefied petroleum gas
    Lpg,
}

impl FuelType {
    /// Wire representation of the fuel type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Petrol => "PETROL",
            Self::Diesel => "DIESEL",
            Self::Electric => "ELECTRIC",
            Self::Hybrid => "HYBRID",
            Self::Lpg => "LPG",
        }
    }
}

/// Seller contact details attached to a listing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactInfo {
    /// First name of the seller
    pub first_name: String,
    /// Last name of the seller
    pub last_name: String,
    /// Email address of the seller
    pub email: String,
    /// Phone number of the seller
    pub phone_number: String,
}

impl ContactInfo {
    /// Create contact details.
    #[must_use]
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        email: impl Into<String>,
        phone_number: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            email: email.into(),
            phone_number: phone_number.into(),
        }
    }
}

/// A vehicle listing as stored in the catalog.
///
/// `id` is assigned by the store on first persistence. `date_created` is stamped
/// once when the listing is created and never overwritten; `date_updated` is set
/// on every successful update.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    /// Store-assigned identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Manufacturer
    pub make: String,
    /// Model name
    pub model: String,
    /// Year of production
    pub production_year: i32,
    /// Odometer reading
    pub mileage: i64,
    /// Gearbox
    pub transmission_type: TransmissionType,
    /// Fuel
    pub fuel_type: FuelType,
    /// Seller contact details
    pub contact_info: ContactInfo,
    /// Date the listing was first persisted
    #[serde(default)]
    pub date_created: Option<NaiveDate>,
    /// Date of the last successful update
    #[serde(default)]
    pub date_updated: Option<NaiveDate>,
}

impl Listing {
    /// Create a listing that has not been persisted yet.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        make: impl Into<String>,
        model: impl Into<String>,
        production_year: i32,
        mileage: i64,
        transmission_type: TransmissionType,
        fuel_type: FuelType,
        contact_info: ContactInfo,
    ) -> Self {
        Self {
            id: None,
            make: make.into(),
            model: model.into(),
            production_year,
            mileage,
            transmission_type,
            fuel_type,
            contact_info,
            date_created: None,
            date_updated: None,
        }
    }

    /// Set the identity of the listing.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }
}

/// Sort direction for paginated reads.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

impl SortDirection {
    /// SQL keyword for this direction.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Apply this direction to an ascending ordering.
    #[must_use]
    pub const fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

/// Fixed set of listing paths addressable by search terms and sorting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingField {
    /// `id`
    #[serde(rename = "id")]
    Id,
    /// `make`
    #[serde(rename = "make")]
    Make,
    /// `model`
    #[serde(rename = "model")]
    Model,
    /// `productionYear`
    #[serde(rename = "productionYear")]
    ProductionYear,
    /// `mileage`
    #[serde(rename = "mileage")]
    Mileage,
    /// `transmissionType`
    #[serde(rename = "transmissionType")]
    TransmissionType,
    /// `fuelType`
    #[serde(rename = "fuelType")]
    FuelType,
    /// `dateCreated`
    #[serde(rename = "dateCreated")]
    DateCreated,
    /// `dateUpdated`
    #[serde(rename = "dateUpdated")]
    DateUpdated,
    /// `contactInfo.firstName`
    #[serde(rename = "contactInfo.firstName")]
    ContactFirstName,
    /// `contactInfo.lastName`
    #[serde(rename = "contactInfo.lastName")]
    ContactLastName,
    /// `contactInfo.email`
    #[serde(rename = "contactInfo.email")]
    ContactEmail,
    /// `contactInfo.phoneNumber`
    #[serde(rename = "contactInfo.phoneNumber")]
    ContactPhoneNumber,
}

/// Typed value of a field, used for ordering.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum SortKey<'a> {
    Number(i64),
    Date(NaiveDate),
    Text(&'a str),
}

impl ListingField {
    /// Every addressable field, in declaration order.
    pub const ALL: [Self; 13] = [
        Self::Id,
        Self::Make,
        Self::Model,
        Self::ProductionYear,
        Self::Mileage,
        Self::TransmissionType,
        Self::FuelType,
        Self::DateCreated,
        Self::DateUpdated,
        Self::ContactFirstName,
        Self::ContactLastName,
        Self::ContactEmail,
        Self::ContactPhoneNumber,
    ];

    /// Dotted document path of the field.
    #[must_use]
    pub const fn path(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Make => "make",
            Self::Model => "model",
            Self::ProductionYear => "productionYear",
            Self::Mileage => "mileage",
            Self::TransmissionType => "transmissionType",
            Self::FuelType => "fuelType",
            Self::DateCreated => "dateCreated",
            Self::DateUpdated => "dateUpdated",
            Self::ContactFirstName => "contactInfo.firstName",
            Self::ContactLastName => "contactInfo.lastName",
            Self::ContactEmail => "contactInfo.email",
            Self::ContactPhoneNumber => "contactInfo.phoneNumber",
        }
    }

    /// Path segments of the field inside the stored document.
    #[must_use]
    pub fn segments(&self) -> Vec<&'static str> {
        self.path().split('.').collect()
    }

    /// Whether the field holds an integer.
    #[must_use]
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::ProductionYear | Self::Mileage)
    }

    /// Look a field up by its document path.
    #[must_use]
    pub fn from_path(path: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.path() == path)
    }

    /// Render the listing's value for this field as text.
    ///
    /// Returns `None` when the listing has no value (unsaved id, missing dates).
    #[must_use]
    pub fn render(&self, listing: &Listing) -> Option<String> {
        match self {
            Self::Id => listing.id.clone(),
            Self::Make => Some(listing.make.clone()),
            Self::Model => Some(listing.model.clone()),
            Self::ProductionYear => Some(listing.production_year.to_string()),
            Self::Mileage => Some(listing.mileage.to_string()),
            Self::TransmissionType => Some(listing.transmission_type.as_str().to_string()),
            Self::FuelType => Some(listing.fuel_type.as_str().to_string()),
            Self::DateCreated => listing.date_created.map(|d| d.to_string()),
            Self::DateUpdated => listing.date_updated.map(|d| d.to_string()),
            Self::ContactFirstName => Some(listing.contact_info.first_name.clone()),
            Self::ContactLastName => Some(listing.contact_info.last_name.clone()),
            Self::ContactEmail => Some(listing.contact_info.email.clone()),
            Self::ContactPhoneNumber => Some(listing.contact_info.phone_number.clone()),
        }
    }

    fn sort_key<'a>(&self, listing: &'a Listing) -> Option<SortKey<'a>> {
        match self {
            Self::Id => listing.id.as_deref().map(SortKey::Text),
            Self::Make => Some(SortKey::Text(&listing.make)),
            Self::Model => Some(SortKey::Text(&listing.model)),
            Self::ProductionYear => Some(SortKey::Number(i64::from(listing.production_year))),
            Self::Mileage => Some(SortKey::Number(listing.mileage)),
            Self::TransmissionType => Some(SortKey::Text(listing.transmission_type.as_str())),
            Self::FuelType => Some(SortKey::Text(listing.fuel_type.as_str())),
            Self::DateCreated => listing.date_created.map(SortKey::Date),
            Self::DateUpdated => listing.date_updated.map(SortKey::Date),
            Self::ContactFirstName => Some(SortKey::Text(&listing.contact_info.first_name)),
            Self::ContactLastName => Some(SortKey::Text(&listing.contact_info.last_name)),
            Self::ContactEmail => Some(SortKey::Text(&listing.contact_info.email)),
            Self::ContactPhoneNumber => Some(SortKey::Text(&listing.contact_info.phone_number)),
        }
    }

    /// Ascending ordering of two listings by this field.
    ///
    /// Missing values sort after present ones.
    #[must_use]
    pub fn compare(&self, a: &Listing, b: &Listing) -> Ordering {
        match (self.sort_key(a), self.sort_key(b)) {
            (Some(left), Some(right)) => left.cmp(&right),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl fmt::Display for ListingField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn listing(make: &str, mileage: i64) -> Listing {
        Listing::new(
            make,
            "Camry",
            2018,
            mileage,
            TransmissionType::Automatic,
            FuelType::Petrol,
            ContactInfo::new("John", "Smith", "john@example.com", "+15550001111"),
        )
    }

    #[test]
    fn listing_serializes_with_camel_case_paths() {
        let json = serde_json::to_value(listing("Toyota", 1000).with_id("abc")).unwrap();
        assert_eq!(json["productionYear"], 2018);
        assert_eq!(json["transmissionType"], "AUTOMATIC");
        assert_eq!(json["contactInfo"]["phoneNumber"], "+15550001111");
        assert_eq!(json["id"], "abc");
    }

    #[test]
    fn every_field_round_trips_through_its_path() {
        for field in ListingField::ALL {
            assert_eq!(ListingField::from_path(field.path()), Some(field));
            let json = serde_json::to_string(&field).unwrap();
            assert_eq!(json, format!("\"{}\"", field.path()));
        }
    }

    #[test]
    fn numeric_fields_compare_numerically() {
        let small = listing("Toyota", 9);
        let large = listing("Toyota", 10);
        assert_eq!(ListingField::Mileage.compare(&small, &large), Ordering::Less);
        // Rendered text would order "10" before "9".
        assert!(ListingField::Mileage.render(&large) < ListingField::Mileage.render(&small));
    }

    #[test]
    fn missing_values_sort_last() {
        let unsaved = listing("Audi", 1);
        let saved = listing("Audi", 1).with_id("x");
        assert_eq!(ListingField::Id.compare(&saved, &unsaved), Ordering::Less);
        assert_eq!(
            SortDirection::Desc.apply(ListingField::Id.compare(&saved, &unsaved)),
            Ordering::Greater
        );
    }
}
