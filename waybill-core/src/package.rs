//! Package tracking record and its parts.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValidationError;

// ============================================================================
// TRACKING NUMBER
// ============================================================================

/// External identifier of a shipment, validated to be non-empty.
///
/// Surrounding whitespace is trimmed on construction, so `" AB123 "` and
/// `"AB123"` address the same package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TrackingNumber(String);

impl TrackingNumber {
    /// Parse a raw tracking number, rejecting empty or blank input.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyTrackingNumber);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackingNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TrackingNumber {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TrackingNumber> for String {
    fn from(value: TrackingNumber) -> Self {
        value.0
    }
}

// ============================================================================
// RECORD PARTS
// ============================================================================

/// One scan of a package at a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub id: i32,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub status: String,
    pub location_id: i32,
}

impl TrackingEvent {
    /// Ordering key used everywhere events are compared in time.
    ///
    /// Events sharing a `(date, time)` pair are ordered by `id`.
    pub fn chronological_key(&self) -> (NaiveDate, NaiveTime, i32) {
        (self.date, self.time, self.id)
    }
}

/// The person a package is addressed to. Exactly one per tracking number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: i32,
    pub name: String,
    pub address: String,
    pub phone: String,
}

/// A depot, hub or delivery point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: i32,
    pub title: String,
    pub city: String,
    pub address: String,
}

// ============================================================================
// AGGREGATE
// ============================================================================

/// Everything known about one shipment, assembled from four relational reads.
///
/// This is also the cache wire format: the JSON encoding of this struct is
/// stored as one field of the shared cache hash, keyed by tracking number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub tracking_number: TrackingNumber,
    pub status: String,
    pub estimated_delivery: NaiveDate,
    /// Chronological, oldest first.
    pub tracking_events: Vec<TrackingEvent>,
    pub recipient: Recipient,
    /// Location of the latest entry in `tracking_events`.
    pub current_location: Location,
}

impl PackageRecord {
    /// The event `current_location` was resolved from.
    pub fn latest_event(&self) -> Option<&TrackingEvent> {
        latest_event(&self.tracking_events)
    }
}

/// Event with the maximal `(date, time)`, ties broken by the highest `id`.
pub fn latest_event(events: &[TrackingEvent]) -> Option<&TrackingEvent> {
    events.iter().max_by_key(|event| event.chronological_key())
}

/// Sort events oldest first.
pub fn sort_chronologically(events: &mut [TrackingEvent]) {
    events.sort_by_key(TrackingEvent::chronological_key);
}
