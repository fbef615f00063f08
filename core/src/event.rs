//! Change events carried on the listings topic.
//!
//! A [`ChangeEvent`] asks for a listing to be created, updated or deleted. Events
//! are JSON documents; decoding is strict so that a payload carrying unknown
//! properties or unknown enum literals is rejected as malformed instead of being
//! half-applied.
//!
//! # Example
//!
//! ```
//! use listings_core::event::{ChangeEvent, ChangeMode};
//!
//! let payload = br#"{"id":"42","mode":"DELETE"}"#;
//! let event = ChangeEvent::decode(payload).unwrap();
//! assert_eq!(event.mode, Some(ChangeMode::Delete));
//! assert_eq!(event.listing_id(), Some("42"));
//! ```

use crate::listing::{FuelType, TransmissionType};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error types for event encoding and decoding.
#[derive(Error, Debug)]
pub enum EventError {
    /// The message carried no payload at all.
    #[error("Event payload is empty")]
    EmptyPayload,

    /// Failed to deserialize event from bytes.
    #[error("Failed to deserialize event: {0}")]
    DeserializationError(String),

    /// Failed to serialize event to bytes.
    #[error("Failed to serialize event: {0}")]
    SerializationError(String),
}

/// Requested operation of a change event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeMode {
    /// Create a new listing
    Create,
    /// Replace the mutable fields of an existing listing
    Update,
    /// Remove a listing
    Delete,
}

impl ChangeMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contact details as carried by an event; every field may be missing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventContactInfo {
    /// First name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// Last name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// Email
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
}

/// Inbound message describing a requested mutation of a listing.
///
/// All candidate fields are optional on the wire; the validator decides which
/// ones a given mode requires.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ChangeEvent {
    /// Target listing id (required for UPDATE and DELETE)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Manufacturer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub make: Option<String>,
    /// Model name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Year of production
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_year: Option<i32>,
    /// Odometer reading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mileage: Option<i64>,
    /// Gearbox
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transmission_type: Option<TransmissionType>,
    /// Fuel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fuel_type: Option<FuelType>,
    /// Seller contact details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<EventContactInfo>,
    /// Requested operation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ChangeMode>,
}

impl ChangeEvent {
    /// Decode an event from its JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::EmptyPayload`] for an empty body and
    /// [`EventError::DeserializationError`] when the body is not a valid event
    /// (bad JSON, unknown property, unknown enum literal, wrong type).
    pub fn decode(payload: &[u8]) -> Result<Self, EventError> {
        if payload.iter().all(u8::is_ascii_whitespace) {
            return Err(EventError::EmptyPayload);
        }
        serde_json::from_slice(payload).map_err(|e| EventError::DeserializationError(e.to_string()))
    }

    /// Encode the event as its JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::SerializationError`] if encoding fails.
    pub fn encode(&self) -> Result<Vec<u8>, EventError> {
        serde_json::to_vec(self).map_err(|e| EventError::SerializationError(e.to_string()))
    }

    /// Target id with blank values treated as absent.
    #[must_use]
    pub fn listing_id(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.trim().is_empty())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_full_create_event() {
        let payload = br#"{
            "make": "Toyota",
            "model": "Camry",
            "productionYear": 2019,
            "mileage": 42000,
            "transmissionType": "AUTOMATIC",
            "fuelType": "HYBRID",
            "contactInfo": {
                "firstName": "Emma",
                "lastName": "Jones",
                "email": "emma@example.com",
                "phoneNumber": "+15551234567"
            },
            "mode": "CREATE"
        }"#;

        let event = ChangeEvent::decode(payload).unwrap();
        assert_eq!(event.mode, Some(ChangeMode::Create));
        assert_eq!(event.fuel_type, Some(FuelType::Hybrid));
        assert_eq!(
            event.contact_info.as_ref().unwrap().first_name.as_deref(),
            Some("Emma")
        );
        assert_eq!(event.listing_id(), None);
    }

    #[test]
    fn missing_mode_decodes_as_none() {
        let event = ChangeEvent::decode(br#"{"make":"Ford"}"#).unwrap();
        assert_eq!(event.mode, None);
    }

    #[test]
    fn rejects_unknown_properties() {
        let err = ChangeEvent::decode(br#"{"mode":"CREATE","colour":"red"}"#).unwrap_err();
        assert!(matches!(err, EventError::DeserializationError(_)));
    }

    #[test]
    fn rejects_unknown_mode_literal() {
        let err = ChangeEvent::decode(br#"{"mode":"UPSERT"}"#).unwrap_err();
        assert!(matches!(err, EventError::DeserializationError(_)));
    }

    #[test]
    fn rejects_empty_payload() {
        assert!(matches!(ChangeEvent::decode(b""), Err(EventError::EmptyPayload)));
        assert!(matches!(ChangeEvent::decode(b"  \n"), Err(EventError::EmptyPayload)));
    }

    #[test]
    fn blank_id_is_treated_as_absent() {
        let event = ChangeEvent {
            id: Some("   ".to_string()),
            ..ChangeEvent::default()
        };
        assert_eq!(event.listing_id(), None);
    }

    #[test]
    fn encode_omits_absent_fields() {
        let event = ChangeEvent {
            id: Some("7".to_string()),
            mode: Some(ChangeMode::Delete),
            ..ChangeEvent::default()
        };
        let json = String::from_utf8(event.encode().unwrap()).unwrap();
        assert_eq!(json, r#"{"id":"7","mode":"DELETE"}"#);
    }
}
