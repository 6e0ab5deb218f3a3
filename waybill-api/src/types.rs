//! Response envelope shared by every endpoint.

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ErrorCode};

/// Outcome marker in the envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Success,
    Error,
}

/// Error section of a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// HTTP status code, repeated in the body
    pub code: u16,
    /// Machine-readable error kind
    pub kind: ErrorCode,
    pub message: String,
}

/// `{"status": ..., "data": ..., "error": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub status: EnvelopeStatus,
    pub data: Option<T>,
    pub error: Option<ErrorBody>,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self {
            status: EnvelopeStatus::Success,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: &ApiError) -> Self {
        Self {
            status: EnvelopeStatus::Error,
            data: None,
            error: Some(ErrorBody {
                code: error.status_code().as_u16(),
                kind: error.code,
                message: error.message.clone(),
            }),
        }
    }
}
