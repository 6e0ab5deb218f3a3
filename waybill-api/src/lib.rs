//! Waybill API
//!
//! HTTP gateway for package lookups. Records are assembled from PostgreSQL
//! by [`db::DbClient`] and cached in a Redis hash through the cache-aside
//! lookup from `waybill-storage`.

pub mod config;
pub mod db;
pub mod error;
pub mod macros;
pub mod routes;
pub mod state;
pub mod telemetry;
pub mod types;

pub use config::{ApiConfig, CacheBackendKind, CacheSettings};
pub use db::{DbClient, DbConfig};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use routes::create_api_router;
pub use state::{ApiLookup, AppState};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
pub use types::{Envelope, EnvelopeStatus, ErrorBody};
