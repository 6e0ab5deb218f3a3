//! Waybill API server binary.

use std::sync::Arc;

use waybill_api::{
    create_api_router, init_tracing, ApiConfig, ApiError, ApiResult, AppState, CacheSettings,
    DbClient, DbConfig, TelemetryConfig,
};

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing(&TelemetryConfig::default())?;

    let db_config = DbConfig::from_env();
    let db = DbClient::from_config(&db_config)?;
    // Fail fast when the database is unreachable.
    let packages = db.package_count().await.map_err(|e| {
        tracing::error!(host = %db_config.host, error = %e, "database unreachable at startup");
        ApiError::from(e)
    })?;
    tracing::info!(packages, host = %db_config.host, "Connected to PostgreSQL");

    let cache_settings = CacheSettings::from_env()?;
    let cache = cache_settings.build_store().await?;
    tracing::info!(
        backend = ?cache_settings.backend,
        namespace = %cache_settings.namespace,
        ttl_secs = cache_settings.ttl.as_secs(),
        expiry_scope = ?cache_settings.expiry_scope,
        "Cache store ready"
    );

    let state = AppState::from_parts(cache, Arc::new(db), cache_settings.cache_config());
    let app = create_api_router(state);

    let addr = ApiConfig::from_env()?.socket_addr()?;
    tracing::info!(%addr, "Starting Waybill API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}
