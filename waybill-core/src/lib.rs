//! Waybill Core - Package Tracking Types
//!
//! Plain data structures shared by every other crate: the aggregate
//! [`PackageRecord`] assembled from relational storage, its parts, the
//! validated [`TrackingNumber`] key, and the error taxonomy.

pub mod error;
pub mod package;

pub use error::{Backend, RecordPart, ValidationError, WaybillError, WaybillResult};
pub use package::{
    latest_event, sort_chronologically, Location, PackageRecord, Recipient, TrackingEvent,
    TrackingNumber,
};
