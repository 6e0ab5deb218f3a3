//! Redis-backed cache store.
//!
//! Packages are fields of one Redis hash:
//!
//! ```text
//! HGET     logistics_cache <tracking number>
//! HSET     logistics_cache <tracking number> <json>
//! PEXPIRE  logistics_cache <ttl ms>                        (namespace scope)
//! HPEXPIRE logistics_cache <ttl ms> FIELDS 1 <tracking number>  (entry scope, Redis 7.4+)
//! ```
//!
//! Connections go through a [`ConnectionManager`], which multiplexes one
//! connection across tasks and reconnects after failures. Commands are
//! attempted exactly once.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use waybill_core::{WaybillError, WaybillResult};

use super::cache_aside::MAX_TTL;
use super::traits::{CacheStore, ExpiryTarget};

/// Error type for Redis cache operations.
#[derive(Debug, thiserror::Error)]
pub enum RedisCacheError {
    /// The connection URL could not be parsed.
    #[error("Invalid Redis URL: {0}")]
    InvalidUrl(String),

    /// The server could not be reached.
    #[error("Failed to connect to Redis: {0}")]
    Connect(String),

    /// The TTL is above the accepted ceiling.
    #[error("Cache TTL out of range: {0:?}")]
    TtlOutOfRange(Duration),

    /// A command failed.
    #[error("Redis {command} failed: {reason}")]
    Command {
        command: &'static str,
        reason: String,
    },
}

impl From<RedisCacheError> for WaybillError {
    fn from(e: RedisCacheError) -> Self {
        WaybillError::cache(e.to_string())
    }
}

fn command_error(command: &'static str) -> impl FnOnce(redis::RedisError) -> RedisCacheError {
    move |e| RedisCacheError::Command {
        command,
        reason: e.to_string(),
    }
}

/// Redis hash cache store.
#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
    namespace: String,
}

impl RedisCacheStore {
    /// Connect to Redis and verify the connection.
    ///
    /// # Arguments
    ///
    /// * `url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `namespace` - Name of the shared hash holding every package
    pub async fn connect(url: &str, namespace: impl Into<String>) -> Result<Self, RedisCacheError> {
        let client = Client::open(url).map_err(|e| RedisCacheError::InvalidUrl(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| RedisCacheError::Connect(e.to_string()))?;

        let store = Self {
            conn,
            namespace: namespace.into(),
        };
        store.ping_inner().await?;
        Ok(store)
    }

    async fn ping_inner(&self) -> Result<(), RedisCacheError> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(command_error("PING"))?;
        Ok(())
    }
}

/// Milliseconds for PEXPIRE, rounded up so sub-millisecond TTLs do not
/// turn into an immediate delete.
fn ttl_millis(ttl: Duration) -> Result<i64, RedisCacheError> {
    if ttl > MAX_TTL {
        return Err(RedisCacheError::TtlOutOfRange(ttl));
    }
    let millis = ttl.as_millis();
    let millis = if ttl.subsec_nanos() % 1_000_000 != 0 {
        millis + 1
    } else {
        millis
    };
    i64::try_from(millis).map_err(|_| RedisCacheError::TtlOutOfRange(ttl))
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn get(&self, key: &str) -> WaybillResult<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .hget(&self.namespace, key)
            .await
            .map_err(command_error("HGET"))?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &[u8]) -> WaybillResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .hset(&self.namespace, key, value)
            .await
            .map_err(command_error("HSET"))?;
        Ok(())
    }

    async fn set_expiry(&self, target: ExpiryTarget<'_>, ttl: Duration) -> WaybillResult<()> {
        let mut conn = self.conn.clone();
        let millis = ttl_millis(ttl)?;

        match target {
            ExpiryTarget::Namespace => {
                let applied: i64 = redis::cmd("PEXPIRE")
                    .arg(&self.namespace)
                    .arg(millis)
                    .query_async(&mut conn)
                    .await
                    .map_err(command_error("PEXPIRE"))?;
                if applied == 0 {
                    tracing::debug!(namespace = %self.namespace, "PEXPIRE on missing hash");
                }
            }
            ExpiryTarget::Entry(key) => {
                let codes: Vec<i64> = redis::cmd("HPEXPIRE")
                    .arg(&self.namespace)
                    .arg(millis)
                    .arg("FIELDS")
                    .arg(1)
                    .arg(key)
                    .query_async(&mut conn)
                    .await
                    .map_err(command_error("HPEXPIRE"))?;
                // -2 means the field vanished between HSET and HPEXPIRE.
                if codes.first() == Some(&-2) {
                    tracing::debug!(namespace = %self.namespace, key, "HPEXPIRE on missing field");
                }
            }
        }
        Ok(())
    }

    async fn ping(&self) -> WaybillResult<()> {
        self.ping_inner().await.map_err(WaybillError::from)
    }
}

impl std::fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheStore")
            .field("namespace", &self.namespace)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_millis() {
        assert_eq!(ttl_millis(Duration::from_secs(7200)).unwrap(), 7_200_000);
        assert_eq!(ttl_millis(Duration::from_millis(1500)).unwrap(), 1500);
        assert_eq!(ttl_millis(Duration::from_micros(1)).unwrap(), 1);
        assert_eq!(ttl_millis(Duration::from_micros(2500)).unwrap(), 3);
        assert_eq!(ttl_millis(MAX_TTL).unwrap(), 2_592_000_000);
    }

    #[test]
    fn test_ttl_millis_rejects_oversized() {
        assert!(matches!(
            ttl_millis(Duration::MAX),
            Err(RedisCacheError::TtlOutOfRange(_))
        ));
        let err: WaybillError = ttl_millis(MAX_TTL + Duration::from_millis(1))
            .unwrap_err()
            .into();
        assert!(err.is_transient());
    }

    #[test]
    fn test_error_maps_to_transient_cache() {
        let err: WaybillError = RedisCacheError::Command {
            command: "HGET",
            reason: "connection reset".to_string(),
        }
        .into();
        assert!(err.is_transient());
        assert!(err.to_string().contains("HGET"));
    }

    #[tokio::test]
    async fn test_connect_rejects_bad_url() {
        let result = RedisCacheStore::connect("not a url", "logistics_cache").await;
        assert!(matches!(result, Err(RedisCacheError::InvalidUrl(_))));
    }

    #[cfg(feature = "redis-tests")]
    mod live {
        use super::*;

        async fn store() -> RedisCacheStore {
            let url = std::env::var("WAYBILL_REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
            RedisCacheStore::connect(&url, "waybill_test_cache")
                .await
                .expect("Redis must be reachable for redis-tests")
        }

        #[tokio::test]
        async fn test_hash_round_trip() {
            let store = store().await;
            store.put("TW-live-1", b"{\"k\":1}").await.unwrap();
            assert_eq!(
                store.get("TW-live-1").await.unwrap(),
                Some(b"{\"k\":1}".to_vec())
            );
            store
                .set_expiry(ExpiryTarget::Namespace, Duration::from_secs(30))
                .await
                .unwrap();
            assert_eq!(store.get("TW-live-missing").await.unwrap(), None);
        }
    }
}
