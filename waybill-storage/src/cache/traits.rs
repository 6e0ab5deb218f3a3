//! Cache store trait and lookup statistics.

use std::time::Duration;

use async_trait::async_trait;
use waybill_core::WaybillResult;

/// How far a TTL refresh reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryScope {
    /// One expiry for the whole namespace hash. Refreshing it after any
    /// miss-fill extends the lifetime of every cached package.
    #[default]
    Namespace,
    /// Each field expires on its own.
    Entry,
}

/// What a single `set_expiry` call applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryTarget<'a> {
    Namespace,
    Entry(&'a str),
}

impl ExpiryScope {
    /// Resolve the target for a fill of `key`.
    pub fn target(self, key: &str) -> ExpiryTarget<'_> {
        match self {
            ExpiryScope::Namespace => ExpiryTarget::Namespace,
            ExpiryScope::Entry => ExpiryTarget::Entry(key),
        }
    }
}

/// Keyed byte store holding serialized package records.
///
/// All keys live as fields of one hash named by [`CacheStore::namespace`].
/// Implementations must be safe for concurrent use by simultaneous lookups;
/// callers apply no locking around them.
///
/// A miss is `Ok(None)`. Any `Err` is an infrastructure failure and is
/// surfaced to the caller as-is.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Name of the shared hash.
    fn namespace(&self) -> &str;

    /// Read the raw payload for `key`.
    async fn get(&self, key: &str) -> WaybillResult<Option<Vec<u8>>>;

    /// Write the raw payload for `key`, replacing any previous value.
    async fn put(&self, key: &str, value: &[u8]) -> WaybillResult<()>;

    /// Set the time-to-live of the namespace or of a single field.
    async fn set_expiry(&self, target: ExpiryTarget<'_>, ttl: Duration) -> WaybillResult<()>;

    /// Cheap connectivity probe for readiness checks.
    async fn ping(&self) -> WaybillResult<()>;
}

/// Statistics about lookups served by a cache-aside orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache.
    pub hits: u64,
    /// Lookups that went to the assembler.
    pub misses: u64,
    /// Records written back after a miss.
    pub fills: u64,
    /// Miss-fills whose cache write failed (logged, not surfaced).
    pub fill_failures: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
