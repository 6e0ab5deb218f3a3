//! Health Check Endpoints
//!
//! - /hi - Legacy liveness probe
//! - /health/ping - Simple liveness check
//! - /health/live - Process alive check
//! - /health/ready - Database and cache connectivity, plus lookup counters

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Instant;
use waybill_core::WaybillResult;
use waybill_storage::{CacheStats, CacheStore, RecordAssembler};

use crate::state::AppState;
use crate::types::EnvelopeStatus;

// ============================================================================
// TYPES
// ============================================================================

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub database: ComponentHealth,
    pub cache: ComponentHealth,
    pub lookups: LookupCounters,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupCounters {
    pub hits: u64,
    pub misses: u64,
    pub fills: u64,
    pub fill_failures: u64,
    pub hit_rate: f64,
}

impl From<CacheStats> for LookupCounters {
    fn from(stats: CacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            fills: stats.fills,
            fill_failures: stats.fill_failures,
            hit_rate: stats.hit_rate(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiResponse {
    pub status: EnvelopeStatus,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /hi
pub async fn hi() -> impl IntoResponse {
    Json(HiResponse {
        status: EnvelopeStatus::Success,
    })
}

/// GET /health/ping - Simple pong response
pub async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - Process liveness check
pub async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - Readiness check
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let lookup = &state.lookup;
    let database = check_component(lookup.assembler().ping()).await;
    let cache = check_component(lookup.cache().ping()).await;

    let overall_status = if database.status == HealthStatus::Healthy
        && cache.status == HealthStatus::Healthy
    {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };

    let response = HealthResponse {
        status: overall_status,
        message: None,
        details: Some(HealthDetails {
            database,
            cache,
            lookups: lookup.stats().into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    let status_code = if overall_status == HealthStatus::Healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

async fn check_component(probe: impl Future<Output = WaybillResult<()>>) -> ComponentHealth {
    let start = Instant::now();
    match probe.await {
        Ok(()) => ComponentHealth {
            status: HealthStatus::Healthy,
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => ComponentHealth {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            error: Some(e.to_string()),
        },
    }
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/hi", get(hi))
        .route("/health/ping", get(ping))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
}
