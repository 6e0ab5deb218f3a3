//! Waybill Storage - Cache-Aside Lookup
//!
//! Defines the two seams the lookup path depends on ([`RecordAssembler`] for
//! the relational source of truth, [`CacheStore`] for the shared cache hash)
//! and the orchestrator that ties them together. The PostgreSQL assembler
//! lives in waybill-api.

pub mod cache;

pub use cache::{
    CacheAsideLookup, CacheConfig, CacheRead, CacheStats, CacheStore, ExpiryScope, ExpiryTarget,
    FlightGuard, InFlight, InMemoryCacheStore, ReadSource, RecordAssembler, RedisCacheError,
    RedisCacheStore, DEFAULT_NAMESPACE, DEFAULT_TTL, MAX_TTL,
};
