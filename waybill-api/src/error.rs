//! Error Types for the Waybill API
//!
//! This module defines error handling for the HTTP layer:
//! - ErrorCode enum for categorizing errors
//! - ApiError struct carried by handlers
//! - IntoResponse implementation producing the response envelope
//!
//! Every lookup error kind keeps its own status code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use waybill_core::{Backend, WaybillError};

use crate::types::Envelope;

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // ========================================================================
    // Validation Errors (400)
    // ========================================================================
    /// Request contains invalid input data
    InvalidInput,

    /// Required field is missing from request
    MissingField,

    // ========================================================================
    // Not Found Errors (404)
    // ========================================================================
    /// No package, recipient or current location for the tracking number
    PackageNotFound,

    // ========================================================================
    // Server Errors (500, 503)
    // ========================================================================
    /// Cached payload could not be decoded
    CorruptCacheEntry,

    /// Internal server error
    InternalError,

    /// Database unreachable or failing
    DatabaseUnavailable,

    /// Cache unreachable or failing
    CacheUnavailable,
}

impl ErrorCode {
    /// Get the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput | ErrorCode::MissingField => StatusCode::BAD_REQUEST,

            ErrorCode::PackageNotFound => StatusCode::NOT_FOUND,

            ErrorCode::CorruptCacheEntry | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }

            ErrorCode::DatabaseUnavailable | ErrorCode::CacheUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        }
    }

    /// Get a default message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Invalid input data",
            ErrorCode::MissingField => "Required field is missing",
            ErrorCode::PackageNotFound => "Package not found",
            ErrorCode::CorruptCacheEntry => "Cached package data is corrupt",
            ErrorCode::InternalError => "Internal server error",
            ErrorCode::DatabaseUnavailable => "Database temporarily unavailable",
            ErrorCode::CacheUnavailable => "Cache temporarily unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR STRUCT
// ============================================================================

/// Structured error returned by every endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// Error code categorizing the error
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

impl ApiError {
    /// Create a new API error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create a new API error with the given code, using the default message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    // ========================================================================
    // Convenience constructors for common errors
    // ========================================================================

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Create a MissingField error.
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingField,
            format!("Required field '{}' is missing", field),
        )
    }

    /// Create an InternalError.
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a DatabaseUnavailable error.
    pub fn database_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseUnavailable, message)
    }

    /// Create a CacheUnavailable error.
    pub fn cache_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CacheUnavailable, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

// ============================================================================
// AXUM INTEGRATION
// ============================================================================

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(Envelope::<()>::failure(&self));
        (status, body).into_response()
    }
}

// ============================================================================
// CONVERSIONS
// ============================================================================

impl From<WaybillError> for ApiError {
    fn from(err: WaybillError) -> Self {
        match &err {
            WaybillError::Validation(_) => ApiError::invalid_input(err.to_string()),
            WaybillError::NotFound { .. } => ApiError::new(ErrorCode::PackageNotFound, err.to_string()),
            WaybillError::Serialization { .. } => {
                tracing::error!(error = %err, "corrupt cache entry");
                ApiError::from_code(ErrorCode::CorruptCacheEntry)
            }
            // Backend details stay in the logs.
            WaybillError::Transient { backend, .. } => {
                tracing::error!(error = %err, "lookup backend failure");
                match backend {
                    Backend::Database => ApiError::from_code(ErrorCode::DatabaseUnavailable),
                    Backend::Cache => ApiError::from_code(ErrorCode::CacheUnavailable),
                }
            }
        }
    }
}

/// Result type alias for API operations.
pub type ApiResult<T> = Result<T, ApiError>;
