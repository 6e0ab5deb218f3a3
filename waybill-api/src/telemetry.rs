//! Tracing subscriber initialization.
//!
//! Logs go to stdout as JSON by default; `WAYBILL_LOG_FORMAT=pretty` switches
//! to human-readable output. Filtering follows `RUST_LOG`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ApiError, ApiResult};

const DEFAULT_FILTER: &str = "waybill_api=info,waybill_storage=info,tower_http=info,info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup event
    pub service_name: String,
    /// Service version
    pub service_version: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: std::env::var("WAYBILL_SERVICE_NAME")
                .unwrap_or_else(|_| "waybill-api".to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            format: match std::env::var("WAYBILL_LOG_FORMAT").as_deref() {
                Ok("pretty") => LogFormat::Pretty,
                _ => LogFormat::Json,
            },
        }
    }
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let (json, pretty) = match config.format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer().pretty())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json)
        .with(pretty)
        .try_init()
        .map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(
        service_name = config.service_name,
        service_version = config.service_version,
        format = ?config.format,
        "Telemetry initialized"
    );

    Ok(())
}
