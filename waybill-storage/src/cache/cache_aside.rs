//! Cache-aside orchestration for package lookups.
//!
//! Each lookup first consults the [`CacheStore`]. On a miss the
//! [`RecordAssembler`] builds the record from relational storage and the
//! result is written back on a best-effort basis. Cache read failures are
//! fail-fast: they surface to the caller and never fall back to the database.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use waybill_core::{Backend, PackageRecord, TrackingNumber, WaybillError, WaybillResult};

use super::read::CacheRead;
use super::single_flight::InFlight;
use super::traits::{CacheStats, CacheStore, ExpiryScope};

/// Name of the shared hash holding every cached package.
pub const DEFAULT_NAMESPACE: &str = "logistics_cache";

/// Default lifetime of cached packages: two hours.
pub const DEFAULT_TTL: Duration = Duration::from_secs(2 * 60 * 60);

/// Longest lifetime a cache store accepts: thirty days.
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Configuration for the cache-aside lookup.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime applied after every miss-fill.
    pub ttl: Duration,
    /// Whether the TTL covers the whole namespace or only the filled entry.
    pub expiry_scope: ExpiryScope,
    /// Collapse concurrent misses for the same key into one assembler call.
    pub single_flight: bool,
    /// Upper bound for each individual cache or assembler call.
    pub operation_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            expiry_scope: ExpiryScope::Namespace,
            single_flight: true,
            operation_timeout: None,
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the entry TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the TTL scope.
    pub fn with_expiry_scope(mut self, scope: ExpiryScope) -> Self {
        self.expiry_scope = scope;
        self
    }

    /// Enable or disable single-flight miss handling.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.single_flight = enabled;
        self
    }

    /// Bound every backend call by `timeout`.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}

/// Builds a [`PackageRecord`] from the source of truth.
///
/// Implementations return `NotFound` when the base, recipient or current
/// location row is absent, and `Transient` for connectivity failures. They
/// must not retry.
#[async_trait]
pub trait RecordAssembler: Send + Sync {
    async fn fetch_record(&self, tracking_number: &TrackingNumber) -> WaybillResult<PackageRecord>;

    /// Connectivity probe for readiness checks.
    async fn ping(&self) -> WaybillResult<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    fills: AtomicU64,
    fill_failures: AtomicU64,
}

/// Cache-aside lookup over a [`CacheStore`] and a [`RecordAssembler`].
///
/// Both collaborators are shared through `Arc` and may be trait objects,
/// which is how the API picks its cache backend at startup:
///
/// ```ignore
/// let cache: Arc<dyn CacheStore> = Arc::new(InMemoryCacheStore::default());
/// let lookup = CacheAsideLookup::new(cache, Arc::new(db), CacheConfig::default());
/// ```
pub struct CacheAsideLookup<C, A>
where
    C: CacheStore + ?Sized,
    A: RecordAssembler + ?Sized,
{
    cache: Arc<C>,
    assembler: Arc<A>,
    config: CacheConfig,
    flights: InFlight,
    counters: Arc<Counters>,
}

impl<C, A> CacheAsideLookup<C, A>
where
    C: CacheStore + ?Sized,
    A: RecordAssembler + ?Sized,
{
    pub fn new(cache: Arc<C>, assembler: Arc<A>, config: CacheConfig) -> Self {
        Self {
            cache,
            assembler,
            config,
            flights: InFlight::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Create a lookup with default configuration.
    pub fn with_defaults(cache: Arc<C>, assembler: Arc<A>) -> Self {
        Self::new(cache, assembler, CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn assembler(&self) -> &A {
        &self.assembler
    }

    /// Snapshot of the lookup counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            fills: self.counters.fills.load(Ordering::Relaxed),
            fill_failures: self.counters.fill_failures.load(Ordering::Relaxed),
        }
    }

    /// Look up a package by its raw tracking number.
    ///
    /// Blank input is rejected before the cache or the assembler is touched.
    pub async fn lookup(&self, tracking_number: &str) -> WaybillResult<CacheRead<PackageRecord>> {
        let tracking_number = TrackingNumber::parse(tracking_number)?;
        self.lookup_number(&tracking_number).await
    }

    /// Look up a package by an already validated tracking number.
    #[tracing::instrument(skip_all, fields(tracking_number = %tracking_number))]
    pub async fn lookup_number(
        &self,
        tracking_number: &TrackingNumber,
    ) -> WaybillResult<CacheRead<PackageRecord>> {
        if let Some(record) = self.read_cached(tracking_number).await? {
            return Ok(self.hit(record));
        }

        if !self.config.single_flight {
            return self.fill(tracking_number).await;
        }

        let _flight = self.flights.acquire(tracking_number.as_str()).await;
        // Another caller may have filled the key while we waited.
        if let Some(record) = self.read_cached(tracking_number).await? {
            return Ok(self.hit(record));
        }
        self.fill(tracking_number).await
    }

    fn hit(&self, record: PackageRecord) -> CacheRead<PackageRecord> {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("cache hit");
        CacheRead::from_cache(record)
    }

    async fn read_cached(
        &self,
        tracking_number: &TrackingNumber,
    ) -> WaybillResult<Option<PackageRecord>> {
        let key = tracking_number.as_str();
        let payload = self
            .bounded(Backend::Cache, "cache read", self.cache.get(key))
            .await
            .inspect_err(|e| tracing::error!(error = %e, "cache read failed"))?;

        match payload {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| WaybillError::serialization(tracking_number, e)),
            None => Ok(None),
        }
    }

    async fn fill(
        &self,
        tracking_number: &TrackingNumber,
    ) -> WaybillResult<CacheRead<PackageRecord>> {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("cache miss, assembling from storage");

        let record = self
            .bounded(
                Backend::Database,
                "record assembly",
                self.assembler.fetch_record(tracking_number),
            )
            .await?;

        match self.write_back(tracking_number, &record).await {
            Ok(()) => {
                self.counters.fills.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.fill_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(error = %e, "failed to populate cache, serving uncached record");
            }
        }

        Ok(CacheRead::from_storage(record))
    }

    async fn write_back(
        &self,
        tracking_number: &TrackingNumber,
        record: &PackageRecord,
    ) -> WaybillResult<()> {
        let key = tracking_number.as_str();
        let payload =
            serde_json::to_vec(record).map_err(|e| WaybillError::serialization(key, e))?;

        self.bounded(Backend::Cache, "cache write", self.cache.put(key, &payload))
            .await?;
        self.bounded(
            Backend::Cache,
            "cache expiry",
            self.cache
                .set_expiry(self.config.expiry_scope.target(key), self.config.ttl),
        )
        .await
    }

    async fn bounded<T, F>(&self, backend: Backend, operation: &str, call: F) -> WaybillResult<T>
    where
        F: Future<Output = WaybillResult<T>>,
    {
        match self.config.operation_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| WaybillError::Transient {
                    backend,
                    reason: format!("{operation} timed out after {limit:?}"),
                })?,
            None => call.await,
        }
    }
}

impl<C, A> Clone for CacheAsideLookup<C, A>
where
    C: CacheStore + ?Sized,
    A: RecordAssembler + ?Sized,
{
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            assembler: Arc::clone(&self.assembler),
            config: self.config.clone(),
            flights: self.flights.clone(),
            counters: Arc::clone(&self.counters),
        }
    }
}
