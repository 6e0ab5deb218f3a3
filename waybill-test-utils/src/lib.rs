//! Waybill Test Utilities
//!
//! Shared test infrastructure for the Waybill workspace:
//! - In-memory relational tables with an assembler over them
//! - Cache stores with switchable failures
//! - Proptest generators for tables and records
//! - Fixtures and assertions

pub use waybill_core::{
    latest_event, sort_chronologically, Backend, Location, PackageRecord, Recipient, RecordPart,
    TrackingEvent, TrackingNumber, WaybillError, WaybillResult,
};
pub use waybill_storage::{CacheStore, ExpiryTarget, InMemoryCacheStore, RecordAssembler};

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

// ============================================================================
// IN-MEMORY TABLES
// ============================================================================

/// Row of the `packages` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRow {
    pub sno: String,
    pub tracking_status: String,
    pub estimated_delivery: NaiveDate,
}

/// Row of the `tracking_details` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRow {
    pub sno: String,
    pub event: TrackingEvent,
}

/// Row of the `recipients` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientRow {
    pub sno: String,
    pub recipient: Recipient,
}

/// The four relational tables, held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageTables {
    pub packages: Vec<PackageRow>,
    pub events: Vec<EventRow>,
    pub recipients: Vec<RecipientRow>,
    pub locations: Vec<Location>,
}

impl PackageTables {
    /// Tracking numbers of every base row.
    pub fn tracking_numbers(&self) -> Vec<TrackingNumber> {
        self.packages
            .iter()
            .filter_map(|row| TrackingNumber::parse(&row.sno).ok())
            .collect()
    }

    /// Events of one package in insertion order.
    pub fn events_for(&self, sno: &str) -> Vec<TrackingEvent> {
        self.events
            .iter()
            .filter(|row| row.sno == sno)
            .map(|row| row.event.clone())
            .collect()
    }

    pub fn location(&self, id: i32) -> Option<&Location> {
        self.locations.iter().find(|location| location.id == id)
    }

    /// Assemble a record with the same rules as the SQL assembler.
    pub fn assemble(&self, tracking_number: &TrackingNumber) -> WaybillResult<PackageRecord> {
        let sno = tracking_number.as_str();

        let base = self
            .packages
            .iter()
            .find(|row| row.sno == sno)
            .ok_or_else(|| WaybillError::not_found(sno, RecordPart::Package))?;

        let mut tracking_events = self.events_for(sno);
        sort_chronologically(&mut tracking_events);

        let recipient = self
            .recipients
            .iter()
            .filter(|row| row.sno == sno)
            .min_by_key(|row| row.recipient.id)
            .map(|row| row.recipient.clone())
            .ok_or_else(|| WaybillError::not_found(sno, RecordPart::Recipient))?;

        let current_location = latest_event(&tracking_events)
            .and_then(|event| self.location(event.location_id))
            .cloned()
            .ok_or_else(|| WaybillError::not_found(sno, RecordPart::CurrentLocation))?;

        Ok(PackageRecord {
            tracking_number: tracking_number.clone(),
            status: base.tracking_status.clone(),
            estimated_delivery: base.estimated_delivery,
            tracking_events,
            recipient,
            current_location,
        })
    }
}

// ============================================================================
// IN-MEMORY ASSEMBLER
// ============================================================================

/// [`RecordAssembler`] over [`PackageTables`] that counts its calls.
#[derive(Debug, Default)]
pub struct InMemoryAssembler {
    tables: RwLock<PackageTables>,
    calls: AtomicUsize,
    unavailable: AtomicBool,
    delay: Option<Duration>,
}

impl InMemoryAssembler {
    pub fn new(tables: PackageTables) -> Self {
        Self {
            tables: RwLock::new(tables),
            ..Default::default()
        }
    }

    /// Sleep this long (on the tokio clock) before every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `fetch_record` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Simulate a database outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Mutate the underlying tables, e.g. to make cached data stale.
    pub fn update(&self, f: impl FnOnce(&mut PackageTables)) {
        let mut tables = self
            .tables
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut tables);
    }

    fn check_available(&self) -> WaybillResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(WaybillError::database("connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordAssembler for InMemoryAssembler {
    async fn fetch_record(&self, tracking_number: &TrackingNumber) -> WaybillResult<PackageRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available()?;
        let tables = self
            .tables
            .read()
            .map_err(|_| WaybillError::database("tables lock poisoned"))?;
        tables.assemble(tracking_number)
    }

    async fn ping(&self) -> WaybillResult<()> {
        self.check_available()
    }
}

// ============================================================================
// FAULTY CACHE STORE
// ============================================================================

/// In-memory cache store whose operations can be made to fail.
#[derive(Debug, Default)]
pub struct FaultyCacheStore {
    inner: InMemoryCacheStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_expiry: AtomicBool,
    gets: AtomicUsize,
    puts: AtomicUsize,
}

impl FaultyCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_expiry(&self, fail: bool) {
        self.fail_expiry.store(fail, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &InMemoryCacheStore {
        &self.inner
    }

    /// Store bytes that do not decode as a record.
    pub async fn corrupt(&self, key: &str) -> WaybillResult<()> {
        self.inner.put(key, b"{\"tracking_number\":").await
    }
}

#[async_trait]
impl CacheStore for FaultyCacheStore {
    fn namespace(&self) -> &str {
        self.inner.namespace()
    }

    async fn get(&self, key: &str) -> WaybillResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(WaybillError::cache("HGET failed: connection reset"));
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: &[u8]) -> WaybillResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(WaybillError::cache("HSET failed: read-only replica"));
        }
        self.inner.put(key, value).await
    }

    async fn set_expiry(&self, target: ExpiryTarget<'_>, ttl: Duration) -> WaybillResult<()> {
        if self.fail_expiry.load(Ordering::SeqCst) {
            return Err(WaybillError::cache("PEXPIRE failed: timeout"));
        }
        self.inner.set_expiry(target, ttl).await
    }

    async fn ping(&self) -> WaybillResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(WaybillError::cache("PING failed: connection reset"));
        }
        self.inner.ping().await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating package tables and records.

    use super::*;
    use chrono::{Days, NaiveTime};
    use proptest::prelude::*;

    fn base_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).expect("2024-01-01 is a valid date")
    }

    /// Generate a non-empty tracking number.
    pub fn arb_tracking_number() -> impl Strategy<Value = TrackingNumber> {
        "[A-Z]{2}[0-9]{6,10}".prop_map(|raw| {
            TrackingNumber::parse(&raw).expect("generated tracking number is non-empty")
        })
    }

    /// Generate blank input: empty or whitespace only.
    pub fn arb_blank_input() -> impl Strategy<Value = String> {
        "[ \t\n]{0,4}"
    }

    /// Generate a date in a narrow window so that ties are common.
    pub fn arb_event_date() -> impl Strategy<Value = NaiveDate> {
        (0u64..4).prop_map(|days| base_date() + Days::new(days))
    }

    /// Generate one of a few scan times so that ties are common.
    pub fn arb_event_time() -> impl Strategy<Value = NaiveTime> {
        prop::sample::select(vec![(8u32, 0u32), (12, 30), (17, 45), (23, 59)]).prop_map(|(h, m)| {
            NaiveTime::from_hms_opt(h, m, 0).expect("generated time is valid")
        })
    }

    pub fn arb_status() -> impl Strategy<Value = String> {
        prop::sample::select(vec!["Picked up", "In transit", "Out for delivery", "Delivered"])
            .prop_map(str::to_string)
    }

    fn arb_text() -> impl Strategy<Value = String> {
        "[A-Za-z][A-Za-z ]{2,15}"
    }

    /// Generate the location rows `1..=count`.
    pub fn arb_locations(count: i32) -> impl Strategy<Value = Vec<Location>> {
        prop::collection::vec((arb_text(), arb_text(), arb_text()), count as usize).prop_map(
            |fields| {
                fields
                    .into_iter()
                    .zip(1..)
                    .map(|((title, city, address), id)| Location {
                        id,
                        title,
                        city,
                        address,
                    })
                    .collect()
            },
        )
    }

    #[derive(Debug, Clone)]
    struct PackageSpec {
        status: String,
        delivery_offset: u64,
        recipient: (String, String, String),
        events: Vec<(NaiveDate, NaiveTime, String, i32)>,
    }

    fn arb_package_spec(max_location: i32) -> impl Strategy<Value = PackageSpec> {
        (
            arb_status(),
            0u64..30,
            (arb_text(), arb_text(), "[0-9]{9}"),
            prop::collection::vec(
                (arb_event_date(), arb_event_time(), arb_status(), 1..=max_location),
                1..8,
            ),
        )
            .prop_map(|(status, delivery_offset, recipient, events)| PackageSpec {
                status,
                delivery_offset,
                recipient,
                events,
            })
    }

    /// Generate consistent tables where every package has a recipient, at
    /// least one event, and every event references an existing location.
    ///
    /// Event ids are assigned in generation order, which is independent of
    /// the generated dates and times.
    pub fn arb_package_tables() -> impl Strategy<Value = PackageTables> {
        (1usize..6, 1i32..6)
            .prop_flat_map(|(packages, locations)| {
                (
                    arb_locations(locations),
                    prop::collection::vec(arb_package_spec(locations), packages),
                )
            })
            .prop_map(|(locations, specs)| {
                let mut tables = PackageTables {
                    locations,
                    ..Default::default()
                };
                let mut next_event_id = 1;
                for (index, spec) in specs.into_iter().enumerate() {
                    let sno = format!("TW{:06}", index + 1);
                    tables.packages.push(PackageRow {
                        sno: sno.clone(),
                        tracking_status: spec.status,
                        estimated_delivery: base_date() + Days::new(spec.delivery_offset),
                    });
                    let (name, address, phone) = spec.recipient;
                    tables.recipients.push(RecipientRow {
                        sno: sno.clone(),
                        recipient: Recipient {
                            id: index as i32 + 1,
                            name,
                            address,
                            phone,
                        },
                    });
                    for (date, time, status, location_id) in spec.events {
                        tables.events.push(EventRow {
                            sno: sno.clone(),
                            event: TrackingEvent {
                                id: next_event_id,
                                date,
                                time,
                                status,
                                location_id,
                            },
                        });
                        next_event_id += 1;
                    }
                }
                tables
            })
    }

    /// Generate tables together with one of their tracking numbers.
    pub fn arb_tables_with_known_number() -> impl Strategy<Value = (PackageTables, TrackingNumber)>
    {
        arb_package_tables().prop_flat_map(|tables| {
            let numbers = tables.tracking_numbers();
            (Just(tables), prop::sample::select(numbers))
        })
    }

    /// Generate a complete record.
    pub fn arb_package_record() -> impl Strategy<Value = PackageRecord> {
        arb_tables_with_known_number().prop_map(|(tables, tracking_number)| {
            tables
                .assemble(&tracking_number)
                .expect("generated tables are complete")
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built tables covering the common lookup scenarios.

    use super::*;
    use chrono::NaiveTime;

    /// Complete package with three scans; the latest is at location 3.
    pub const KNOWN: &str = "TW123456";
    /// Base row and events, but no recipient row.
    pub const MISSING_RECIPIENT: &str = "TW000001";
    /// Base row and recipient, but no events.
    pub const NO_EVENTS: &str = "TW000002";
    /// Two scans sharing date and time.
    pub const TIED_SCANS: &str = "TW000003";
    /// Latest scan references a location that does not exist.
    pub const DANGLING_LOCATION: &str = "TW000004";
    /// Not present in any table.
    pub const ABSENT: &str = "TW999999";

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).expect("fixture date is valid")
    }

    fn time(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).expect("fixture time is valid")
    }

    fn package(sno: &str, status: &str) -> PackageRow {
        PackageRow {
            sno: sno.to_string(),
            tracking_status: status.to_string(),
            estimated_delivery: date(20),
        }
    }

    fn event(sno: &str, id: i32, day: u32, at: (u32, u32), status: &str, location_id: i32) -> EventRow {
        EventRow {
            sno: sno.to_string(),
            event: TrackingEvent {
                id,
                date: date(day),
                time: time(at.0, at.1),
                status: status.to_string(),
                location_id,
            },
        }
    }

    fn recipient(sno: &str, id: i32, name: &str) -> RecipientRow {
        RecipientRow {
            sno: sno.to_string(),
            recipient: Recipient {
                id,
                name: name.to_string(),
                address: "12 Harbour Street".to_string(),
                phone: "555010203".to_string(),
            },
        }
    }

    fn location(id: i32, title: &str, city: &str) -> Location {
        Location {
            id,
            title: title.to_string(),
            city: city.to_string(),
            address: format!("{} Depot Road", id),
        }
    }

    /// Tables holding every fixture package.
    pub fn sample_tables() -> PackageTables {
        PackageTables {
            packages: vec![
                package(KNOWN, "In transit"),
                package(MISSING_RECIPIENT, "Picked up"),
                package(NO_EVENTS, "Label created"),
                package(TIED_SCANS, "In transit"),
                package(DANGLING_LOCATION, "In transit"),
            ],
            events: vec![
                // Inserted out of order on purpose.
                event(KNOWN, 3, 12, (9, 15), "Arrived at hub", 3),
                event(KNOWN, 1, 10, (8, 0), "Picked up", 1),
                event(KNOWN, 2, 11, (14, 30), "Departed depot", 2),
                event(MISSING_RECIPIENT, 4, 10, (8, 0), "Picked up", 1),
                event(TIED_SCANS, 5, 11, (10, 0), "Sorted", 1),
                event(TIED_SCANS, 6, 11, (10, 0), "Sorted again", 2),
                event(DANGLING_LOCATION, 7, 11, (10, 0), "Lost scan", 42),
            ],
            recipients: vec![
                recipient(KNOWN, 1, "Ada Byron"),
                recipient(NO_EVENTS, 2, "Grace Hopper"),
                recipient(TIED_SCANS, 3, "Alan Turing"),
                recipient(DANGLING_LOCATION, 4, "Edsger Dijkstra"),
            ],
            locations: vec![
                location(1, "Origin Depot", "Gdansk"),
                location(2, "Regional Depot", "Lodz"),
                location(3, "Central Hub", "Warsaw"),
            ],
        }
    }

    pub fn tracking_number(raw: &str) -> TrackingNumber {
        TrackingNumber::parse(raw).expect("fixture tracking number is non-empty")
    }

    /// The assembled record for [`KNOWN`].
    pub fn sample_record() -> PackageRecord {
        sample_tables()
            .assemble(&tracking_number(KNOWN))
            .expect("fixture package is complete")
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for lookup results.

    use super::*;

    /// Assert that a result is `NotFound` for the given part.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &WaybillResult<T>, part: RecordPart) {
        match result {
            Err(WaybillError::NotFound { missing, .. }) if *missing == part => {}
            other => panic!("Expected NotFound({}), got: {:?}", part, other),
        }
    }

    /// Assert that a result is a transient failure of the given backend.
    #[track_caller]
    pub fn assert_transient<T: std::fmt::Debug>(result: &WaybillResult<T>, expected: Backend) {
        match result {
            Err(WaybillError::Transient { backend, .. }) if *backend == expected => {}
            other => panic!("Expected Transient({}), got: {:?}", expected, other),
        }
    }
}
