//! Property-Based Tests for the Cache-Aside Lookup
//!
//! Runs the orchestrator over the in-memory tables and cache store:
//! - the current location is the location of the latest scan
//! - a second lookup inside the TTL is served from the cache
//! - blank input touches neither backend
//! - unknown tracking numbers are never cached
//! - expired entries are assembled again

use std::time::Duration;

use proptest::prelude::*;
use tokio::runtime::{Builder, Runtime};
use waybill_core::{latest_event, PackageRecord, RecordPart, WaybillError};
use waybill_storage::{CacheConfig, CacheStore, ExpiryScope, DEFAULT_TTL};
use waybill_test_utils::assertions::{assert_not_found, assert_transient};
use waybill_test_utils::generators::*;
use waybill_test_utils::{fixtures, Backend};

#[path = "support/lookup.rs"]
#[allow(dead_code)]
mod test_lookup_support;
use test_lookup_support::lookup_over;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

/// Current-thread runtime on a paused clock, for TTL behavior.
fn paused_runtime() -> Result<Runtime, TestCaseError> {
    Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// The current location is the location of the event with the greatest
    /// `(date, time)`, and events come back oldest first.
    #[test]
    fn prop_current_location_is_latest_scan((tables, tn) in arb_tables_with_known_number()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let (lookup, _cache, _assembler) = lookup_over(tables.clone(), CacheConfig::default());
            let record = lookup.lookup_number(&tn).await?.into_value();

            let events = tables.events_for(tn.as_str());
            let latest = latest_event(&events).expect("generated packages have events");
            let expected = tables.location(latest.location_id).expect("events reference locations");
            prop_assert_eq!(&record.current_location, expected);

            prop_assert_eq!(record.tracking_events.len(), events.len());
            let keys: Vec<_> = record
                .tracking_events
                .iter()
                .map(|event| (event.date, event.time))
                .collect();
            prop_assert!(keys.windows(2).all(|pair| pair[0] <= pair[1]));
            Ok(())
        })?;
    }

    /// A second lookup within the TTL returns an equal record without
    /// invoking the assembler again.
    #[test]
    fn prop_second_lookup_is_served_from_cache((tables, tn) in arb_tables_with_known_number()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let (lookup, _cache, assembler) = lookup_over(tables, CacheConfig::default());

            let first = lookup.lookup(tn.as_str()).await?;
            let second = lookup.lookup(tn.as_str()).await?;

            prop_assert!(first.was_cache_miss());
            prop_assert!(second.was_cache_hit());
            prop_assert_eq!(first.value(), second.value());
            prop_assert_eq!(assembler.calls(), 1);
            Ok(())
        })?;
    }

    /// The cached JSON decodes back to the record it was written from.
    #[test]
    fn prop_cached_payload_decodes_to_same_record(record in arb_package_record()) {
        let payload = serde_json::to_vec(&record)?;
        let decoded: PackageRecord = serde_json::from_slice(&payload)?;
        prop_assert_eq!(decoded, record);
    }

    /// Blank input is rejected before either backend is touched.
    #[test]
    fn prop_blank_input_short_circuits(input in arb_blank_input()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let (lookup, cache, assembler) =
                lookup_over(fixtures::sample_tables(), CacheConfig::default());

            let result = lookup.lookup(&input).await;
            prop_assert!(matches!(result, Err(WaybillError::Validation(_))));
            prop_assert_eq!(cache.gets(), 0);
            prop_assert_eq!(assembler.calls(), 0);
            Ok(())
        })?;
    }

    /// Unknown tracking numbers yield NotFound and leave the cache empty.
    #[test]
    fn prop_absent_package_is_not_cached(
        tables in arb_package_tables(),
        tn in arb_tracking_number(),
    ) {
        prop_assume!(!tables.tracking_numbers().contains(&tn));
        let rt = test_runtime()?;
        rt.block_on(async {
            let (lookup, cache, assembler) = lookup_over(tables, CacheConfig::default());

            let first = lookup.lookup_number(&tn).await;
            assert_not_found(&first, RecordPart::Package);
            prop_assert!(cache.inner().is_empty()?);

            let _ = lookup.lookup_number(&tn).await;
            prop_assert_eq!(assembler.calls(), 2);
            Ok(())
        })?;
    }

    /// Once the TTL has elapsed the assembler runs again.
    #[test]
    fn prop_expired_entry_is_reassembled(
        (tables, tn) in arb_tables_with_known_number(),
        ttl_secs in 1u64..86_400,
    ) {
        let rt = paused_runtime()?;
        rt.block_on(async {
            let ttl = Duration::from_secs(ttl_secs);
            let (lookup, _cache, assembler) =
                lookup_over(tables, CacheConfig::new().with_ttl(ttl));

            lookup.lookup_number(&tn).await?;
            tokio::time::advance(ttl - Duration::from_millis(1)).await;
            prop_assert!(lookup.lookup_number(&tn).await?.was_cache_hit());

            tokio::time::advance(Duration::from_millis(1)).await;
            prop_assert!(lookup.lookup_number(&tn).await?.was_cache_miss());
            prop_assert_eq!(assembler.calls(), 2);
            Ok(())
        })?;
    }
}

// ============================================================================
// SCENARIO TESTS
// ============================================================================

#[tokio::test]
async fn test_missing_parts_are_not_found() {
    let (lookup, cache, _assembler) =
        lookup_over(fixtures::sample_tables(), CacheConfig::default());

    assert_not_found(
        &lookup.lookup(fixtures::MISSING_RECIPIENT).await,
        RecordPart::Recipient,
    );
    assert_not_found(
        &lookup.lookup(fixtures::NO_EVENTS).await,
        RecordPart::CurrentLocation,
    );
    assert_not_found(
        &lookup.lookup(fixtures::DANGLING_LOCATION).await,
        RecordPart::CurrentLocation,
    );
    assert!(cache.inner().is_empty().unwrap());
}

#[tokio::test]
async fn test_surrounding_whitespace_hits_same_entry() {
    let (lookup, _cache, assembler) =
        lookup_over(fixtures::sample_tables(), CacheConfig::default());

    lookup.lookup(fixtures::KNOWN).await.unwrap();
    let padded = format!("  {}\n", fixtures::KNOWN);
    assert!(lookup.lookup(&padded).await.unwrap().was_cache_hit());
    assert_eq!(assembler.calls(), 1);
}

#[tokio::test]
async fn test_cached_record_is_stale_until_expiry() {
    let (lookup, _cache, assembler) =
        lookup_over(fixtures::sample_tables(), CacheConfig::default());

    let before = lookup.lookup(fixtures::KNOWN).await.unwrap().into_value();
    assembler.update(|tables| {
        for package in tables.packages.iter_mut().filter(|p| p.sno == fixtures::KNOWN) {
            package.tracking_status = "Delivered".to_string();
        }
    });

    let after = lookup.lookup(fixtures::KNOWN).await.unwrap().into_value();
    assert_eq!(after, before);
    assert_eq!(after.status, "In transit");
}

#[tokio::test]
async fn test_cache_outage_fails_without_database_fallback() {
    let (lookup, cache, assembler) =
        lookup_over(fixtures::sample_tables(), CacheConfig::default());
    cache.fail_reads(true);

    assert_transient(&lookup.lookup(fixtures::KNOWN).await, Backend::Cache);
    assert_eq!(assembler.calls(), 0);
}

#[tokio::test]
async fn test_database_outage_is_transient() {
    let (lookup, cache, assembler) =
        lookup_over(fixtures::sample_tables(), CacheConfig::default());
    assembler.set_unavailable(true);

    assert_transient(&lookup.lookup(fixtures::KNOWN).await, Backend::Database);
    assert_eq!(cache.puts(), 0);
}

#[tokio::test]
async fn test_write_back_failures_do_not_fail_lookup() {
    let (lookup, cache, assembler) =
        lookup_over(fixtures::sample_tables(), CacheConfig::default());
    cache.fail_writes(true);

    let first = lookup.lookup(fixtures::KNOWN).await.unwrap();
    assert_eq!(first.into_value(), fixtures::sample_record());
    let second = lookup.lookup(fixtures::KNOWN).await.unwrap();
    assert!(second.was_cache_miss());
    assert_eq!(assembler.calls(), 2);
    assert_eq!(lookup.stats().fill_failures, 2);
}

#[tokio::test]
async fn test_expiry_failure_keeps_written_entry() {
    let (lookup, cache, assembler) =
        lookup_over(fixtures::sample_tables(), CacheConfig::default());
    cache.fail_expiry(true);

    assert!(lookup.lookup(fixtures::KNOWN).await.unwrap().was_cache_miss());
    assert!(lookup.lookup(fixtures::KNOWN).await.unwrap().was_cache_hit());
    assert_eq!(assembler.calls(), 1);
    assert_eq!(lookup.stats().fill_failures, 1);
    assert_eq!(cache.inner().namespace_ttl().unwrap(), None);
}

#[tokio::test]
async fn test_corrupt_entry_is_serialization_error() {
    let (lookup, cache, assembler) =
        lookup_over(fixtures::sample_tables(), CacheConfig::default());
    cache.corrupt(fixtures::KNOWN).await.unwrap();

    let result = lookup.lookup(fixtures::KNOWN).await;
    assert!(matches!(result, Err(WaybillError::Serialization { .. })));
    assert_eq!(assembler.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_namespace_scope_refreshes_every_entry() {
    let (lookup, _cache, assembler) =
        lookup_over(fixtures::sample_tables(), CacheConfig::default());

    lookup.lookup(fixtures::KNOWN).await.unwrap();
    tokio::time::advance(DEFAULT_TTL / 2).await;
    lookup.lookup(fixtures::TIED_SCANS).await.unwrap();

    // The second fill pushed the shared deadline past the first entry's TTL.
    tokio::time::advance(DEFAULT_TTL * 3 / 4).await;
    assert!(lookup.lookup(fixtures::KNOWN).await.unwrap().was_cache_hit());

    // Both fall out together.
    tokio::time::advance(DEFAULT_TTL / 4).await;
    assert!(lookup.lookup(fixtures::KNOWN).await.unwrap().was_cache_miss());
    assert!(lookup.lookup(fixtures::TIED_SCANS).await.unwrap().was_cache_miss());
    assert_eq!(assembler.calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_entry_scope_expires_independently() {
    let config = CacheConfig::new().with_expiry_scope(ExpiryScope::Entry);
    let (lookup, _cache, assembler) = lookup_over(fixtures::sample_tables(), config);

    lookup.lookup(fixtures::KNOWN).await.unwrap();
    tokio::time::advance(DEFAULT_TTL / 2).await;
    lookup.lookup(fixtures::TIED_SCANS).await.unwrap();

    tokio::time::advance(DEFAULT_TTL * 3 / 4).await;
    assert!(lookup.lookup(fixtures::KNOWN).await.unwrap().was_cache_miss());
    assert!(lookup.lookup(fixtures::TIED_SCANS).await.unwrap().was_cache_hit());
    assert_eq!(assembler.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_share_one_assembly() {
    let cache = std::sync::Arc::new(waybill_test_utils::FaultyCacheStore::new());
    let assembler = std::sync::Arc::new(
        waybill_test_utils::InMemoryAssembler::new(fixtures::sample_tables())
            .with_delay(Duration::from_millis(100)),
    );
    let lookup = waybill_storage::CacheAsideLookup::with_defaults(cache, assembler.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lookup = lookup.clone();
            tokio::spawn(async move { lookup.lookup(fixtures::KNOWN).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(assembler.calls(), 1);
    assert_eq!(lookup.stats().hits, 7);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_misses_without_single_flight_each_assemble() {
    let cache = std::sync::Arc::new(waybill_test_utils::FaultyCacheStore::new());
    let assembler = std::sync::Arc::new(
        waybill_test_utils::InMemoryAssembler::new(fixtures::sample_tables())
            .with_delay(Duration::from_millis(100)),
    );
    let lookup = waybill_storage::CacheAsideLookup::new(
        cache,
        assembler.clone(),
        CacheConfig::new().with_single_flight(false),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let lookup = lookup.clone();
            tokio::spawn(async move { lookup.lookup(fixtures::KNOWN).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(assembler.calls(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_slow_assembly_times_out_as_transient() {
    let cache = std::sync::Arc::new(waybill_test_utils::FaultyCacheStore::new());
    let assembler = std::sync::Arc::new(
        waybill_test_utils::InMemoryAssembler::new(fixtures::sample_tables())
            .with_delay(Duration::from_secs(5)),
    );
    let lookup = waybill_storage::CacheAsideLookup::new(
        cache.clone(),
        assembler,
        CacheConfig::new().with_operation_timeout(Duration::from_secs(1)),
    );

    assert_transient(&lookup.lookup(fixtures::KNOWN).await, Backend::Database);
    assert_eq!(cache.puts(), 0);
    assert!(cache.ping().await.is_ok());
}
