//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use waybill_storage::{CacheAsideLookup, CacheStore, RecordAssembler};

/// Lookup with the backends chosen at startup.
pub type ApiLookup = CacheAsideLookup<dyn CacheStore, dyn RecordAssembler>;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub lookup: ApiLookup,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(lookup: ApiLookup) -> Self {
        Self {
            lookup,
            start_time: Instant::now(),
        }
    }

    /// Wire a lookup from shared backends.
    pub fn from_parts(
        cache: Arc<dyn CacheStore>,
        assembler: Arc<dyn RecordAssembler>,
        config: waybill_storage::CacheConfig,
    ) -> Self {
        Self::new(CacheAsideLookup::new(cache, assembler, config))
    }
}

crate::impl_from_ref!(ApiLookup, lookup);
crate::impl_from_ref!(Instant, start_time);
