//! API Configuration Module
//!
//! Bind address and cache settings, loaded from environment variables with
//! defaults suitable for local development. Parsing goes through
//! `from_vars` so tests can supply variables without touching the process
//! environment.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use waybill_storage::{
    CacheConfig, CacheStore, ExpiryScope, InMemoryCacheStore, RedisCacheStore, DEFAULT_NAMESPACE,
    DEFAULT_TTL, MAX_TTL,
};

use crate::error::{ApiError, ApiResult};

// ============================================================================
// BIND ADDRESS
// ============================================================================

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl ApiConfig {
    /// Environment variables:
    /// - `WAYBILL_API_BIND`: listen host (default: 0.0.0.0)
    /// - `PORT` or `WAYBILL_API_PORT`: listen port (default: 3000)
    pub fn from_env() -> ApiResult<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> ApiResult<Self> {
        let defaults = Self::default();
        let host = var("WAYBILL_API_BIND").unwrap_or(defaults.host);
        let port = match var("PORT").or_else(|| var("WAYBILL_API_PORT")) {
            Some(port_str) => port_str.parse::<u16>().map_err(|_| {
                ApiError::invalid_input(format!("Invalid port value: {}", port_str))
            })?,
            None => defaults.port,
        };
        Ok(Self { host, port })
    }

    pub fn socket_addr(&self) -> ApiResult<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse::<SocketAddr>().map_err(|e| {
            ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e))
        })
    }
}

// ============================================================================
// CACHE SETTINGS
// ============================================================================

/// Which cache store backs the lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackendKind {
    Redis,
    Memory,
}

/// Cache backend selection plus lookup tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub backend: CacheBackendKind,
    pub redis_url: String,
    pub namespace: String,
    pub ttl: Duration,
    pub expiry_scope: ExpiryScope,
    pub single_flight: bool,
    pub lookup_timeout: Option<Duration>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Redis,
            redis_url: "redis://localhost:6379".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl: DEFAULT_TTL,
            expiry_scope: ExpiryScope::Namespace,
            single_flight: true,
            lookup_timeout: None,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl CacheSettings {
    /// Environment variables:
    /// - `WAYBILL_CACHE_BACKEND`: "redis" or "memory" (default: redis)
    /// - `WAYBILL_REDIS_URL`: connection URL, else `redis://$REDIS_HOST:6379`
    /// - `WAYBILL_CACHE_NAMESPACE`: hash name (default: logistics_cache)
    /// - `WAYBILL_CACHE_TTL_SECS`: entry lifetime, at most 30 days (default: 7200)
    /// - `WAYBILL_CACHE_EXPIRY_SCOPE`: "namespace" or "entry" (default: namespace)
    /// - `WAYBILL_CACHE_SINGLE_FLIGHT`: collapse concurrent misses (default: true)
    /// - `WAYBILL_LOOKUP_TIMEOUT_MS`: per-call deadline (default: none)
    pub fn from_env() -> ApiResult<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> ApiResult<Self> {
        let defaults = Self::default();

        let backend = match var("WAYBILL_CACHE_BACKEND").as_deref().map(str::trim) {
            None | Some("redis") => CacheBackendKind::Redis,
            Some("memory") => CacheBackendKind::Memory,
            Some(other) => {
                return Err(ApiError::invalid_input(format!(
                    "Unknown cache backend: {}",
                    other
                )))
            }
        };

        let redis_url = var("WAYBILL_REDIS_URL")
            .or_else(|| var("REDIS_HOST").map(|host| format!("redis://{}:6379", host)))
            .unwrap_or(defaults.redis_url);

        let ttl = match var("WAYBILL_CACHE_TTL_SECS") {
            Some(secs) => secs
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .filter(|ttl| *ttl <= MAX_TTL)
                .ok_or_else(|| ApiError::invalid_input(format!("Invalid cache TTL: {}", secs)))?,
            None => defaults.ttl,
        };

        let expiry_scope = match var("WAYBILL_CACHE_EXPIRY_SCOPE").as_deref().map(str::trim) {
            None | Some("namespace") => ExpiryScope::Namespace,
            Some("entry") => ExpiryScope::Entry,
            Some(other) => {
                return Err(ApiError::invalid_input(format!(
                    "Unknown cache expiry scope: {}",
                    other
                )))
            }
        };

        let single_flight = var("WAYBILL_CACHE_SINGLE_FLIGHT")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.single_flight);

        let lookup_timeout = var("WAYBILL_LOOKUP_TIMEOUT_MS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis);

        Ok(Self {
            backend,
            redis_url,
            namespace: var("WAYBILL_CACHE_NAMESPACE").unwrap_or(defaults.namespace),
            ttl,
            expiry_scope,
            single_flight,
            lookup_timeout,
        })
    }

    /// Orchestrator configuration derived from these settings.
    pub fn cache_config(&self) -> CacheConfig {
        let config = CacheConfig::new()
            .with_ttl(self.ttl)
            .with_expiry_scope(self.expiry_scope)
            .with_single_flight(self.single_flight);
        match self.lookup_timeout {
            Some(timeout) => config.with_operation_timeout(timeout),
            None => config,
        }
    }

    /// Connect the configured backend. Redis is pinged before returning.
    pub async fn build_store(&self) -> ApiResult<Arc<dyn CacheStore>> {
        match self.backend {
            CacheBackendKind::Redis => {
                let store = RedisCacheStore::connect(&self.redis_url, self.namespace.clone())
                    .await
                    .map_err(|e| ApiError::cache_error(e.to_string()))?;
                Ok(Arc::new(store))
            }
            CacheBackendKind::Memory => Ok(Arc::new(InMemoryCacheStore::new(self.namespace.clone()))),
        }
    }
}
