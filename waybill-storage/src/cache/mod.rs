//! Cache layer for package lookups.
//!
//! Every cached record is one field of a single shared hash (by default
//! `logistics_cache`), holding the JSON encoding of a
//! [`PackageRecord`](waybill_core::PackageRecord). Entries are never
//! invalidated explicitly; they disappear when their TTL runs out.
//!
//! # TTL scope
//!
//! With [`ExpiryScope::Namespace`] the expiry is applied to the whole hash,
//! so every miss-fill extends the lifetime of every other cached package.
//! [`ExpiryScope::Entry`] expires each field on its own instead.
//!
//! # Example
//!
//! ```ignore
//! let lookup = CacheAsideLookup::new(cache, assembler, CacheConfig::default());
//!
//! let read = lookup.lookup("TW123456789").await?;
//! if read.was_cache_miss() {
//!     tracing::debug!("filled from PostgreSQL");
//! }
//! let record = read.into_value();
//! ```

pub mod cache_aside;
pub mod memory_backend;
pub mod read;
pub mod redis_backend;
pub mod single_flight;
pub mod traits;

pub use cache_aside::{
    CacheAsideLookup, CacheConfig, RecordAssembler, DEFAULT_NAMESPACE, DEFAULT_TTL, MAX_TTL,
};
pub use memory_backend::InMemoryCacheStore;
pub use read::{CacheRead, ReadSource};
pub use redis_backend::{RedisCacheError, RedisCacheStore};
pub use single_flight::{FlightGuard, InFlight};
pub use traits::{CacheStats, CacheStore, ExpiryScope, ExpiryTarget};
