use std::sync::Arc;

use waybill_api::{create_api_router, AppState};
use waybill_storage::{CacheAsideLookup, CacheConfig, CacheStore, RecordAssembler};
use waybill_test_utils::{fixtures, FaultyCacheStore, InMemoryAssembler, PackageTables};

pub type TestLookup = CacheAsideLookup<FaultyCacheStore, InMemoryAssembler>;

/// Lookup over in-memory backends, returning handles to both.
pub fn lookup_over(
    tables: PackageTables,
    config: CacheConfig,
) -> (TestLookup, Arc<FaultyCacheStore>, Arc<InMemoryAssembler>) {
    let cache = Arc::new(FaultyCacheStore::new());
    let assembler = Arc::new(InMemoryAssembler::new(tables));
    let lookup = CacheAsideLookup::new(Arc::clone(&cache), Arc::clone(&assembler), config);
    (lookup, cache, assembler)
}

/// Router over the fixture tables with default cache settings.
pub fn fixture_router() -> (axum::Router, Arc<FaultyCacheStore>, Arc<InMemoryAssembler>) {
    let cache = Arc::new(FaultyCacheStore::new());
    let assembler = Arc::new(InMemoryAssembler::new(fixtures::sample_tables()));

    let dyn_cache: Arc<dyn CacheStore> = cache.clone();
    let dyn_assembler: Arc<dyn RecordAssembler> = assembler.clone();
    let state = AppState::from_parts(dyn_cache, dyn_assembler, CacheConfig::default());

    (create_api_router(state), cache, assembler)
}
