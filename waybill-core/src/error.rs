//! Error types for Waybill.

use std::fmt;
use thiserror::Error;

/// Part of a package record whose row was missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordPart {
    Package,
    Recipient,
    CurrentLocation,
}

impl fmt::Display for RecordPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordPart::Package => f.write_str("package"),
            RecordPart::Recipient => f.write_str("recipient"),
            RecordPart::CurrentLocation => f.write_str("current location"),
        }
    }
}

/// Infrastructure a transient failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    Database,
    Cache,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Database => f.write_str("database"),
            Backend::Cache => f.write_str("cache"),
        }
    }
}

/// Input validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Tracking number must not be empty")]
    EmptyTrackingNumber,
}

/// Master error type for lookups.
///
/// Kinds are kept distinct all the way to the HTTP boundary; nothing in the
/// lookup path retries or recovers locally.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WaybillError {
    #[error("Package {tracking_number} not found: no {missing} row")]
    NotFound {
        tracking_number: String,
        missing: RecordPart,
    },

    #[error("Transient {backend} failure: {reason}")]
    Transient { backend: Backend, reason: String },

    #[error("Corrupt cached payload for {tracking_number}: {reason}")]
    Serialization {
        tracking_number: String,
        reason: String,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl WaybillError {
    pub fn not_found(tracking_number: impl fmt::Display, missing: RecordPart) -> Self {
        Self::NotFound {
            tracking_number: tracking_number.to_string(),
            missing,
        }
    }

    pub fn database(reason: impl Into<String>) -> Self {
        Self::Transient {
            backend: Backend::Database,
            reason: reason.into(),
        }
    }

    pub fn cache(reason: impl Into<String>) -> Self {
        Self::Transient {
            backend: Backend::Cache,
            reason: reason.into(),
        }
    }

    pub fn serialization(tracking_number: impl fmt::Display, reason: impl fmt::Display) -> Self {
        Self::Serialization {
            tracking_number: tracking_number.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Result type alias for Waybill operations.
pub type WaybillResult<T> = Result<T, WaybillError>;
