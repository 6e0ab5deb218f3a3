//! Package Lookup Endpoint
//!
//! `GET /query?sno=<tracking number>` runs the cache-aside lookup and wraps
//! the record in the response envelope. The `X-Cache` header reports whether
//! the record came from the cache (`HIT`) or was assembled (`MISS`).

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderName, HeaderValue},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use waybill_storage::ReadSource;

use crate::error::{ApiError, ApiResult};
use crate::state::{ApiLookup, AppState};
use crate::types::Envelope;

/// Response header carrying the cache outcome.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

#[derive(Debug, Deserialize)]
pub struct LookupParams {
    pub sno: Option<String>,
}

/// GET /query - Look up one package
///
/// Query strings that fail to parse are answered inside the envelope too.
pub async fn query_package(
    State(lookup): State<ApiLookup>,
    params: Result<Query<LookupParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) =
        params.map_err(|rejection| ApiError::invalid_input(rejection.body_text()))?;
    let sno = params
        .sno
        .filter(|sno| !sno.trim().is_empty())
        .ok_or_else(|| ApiError::missing_field("sno"))?;

    let read = lookup.lookup(&sno).await?;
    let outcome = match read.source() {
        ReadSource::Cache => "HIT",
        ReadSource::Storage => "MISS",
    };

    Ok((
        [(X_CACHE, HeaderValue::from_static(outcome))],
        Json(Envelope::success(read.into_value())),
    ))
}

pub fn create_router() -> Router<AppState> {
    Router::new().route("/query", get(query_package))
}
