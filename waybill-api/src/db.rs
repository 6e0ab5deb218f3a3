//! Database Connection Pool Module
//!
//! PostgreSQL connection pooling using deadpool-postgres, and the relational
//! record assembler that composes a [`PackageRecord`] from four tables:
//!
//! - `packages`: base row (tracking number, status, estimated delivery)
//! - `tracking_details`: scan events referencing a location
//! - `recipients`: one row per tracking number
//! - `locations`: depots referenced by events
//!
//! The four reads are issued one after another without a transaction, so a
//! concurrent writer can produce a record whose parts come from different
//! points in time.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolError, RecyclingMethod, Runtime, Timeouts};
use std::time::Duration;
use tokio_postgres::{NoTls, Row};
use waybill_core::{
    Location, PackageRecord, Recipient, RecordPart, TrackingEvent, TrackingNumber, WaybillError,
    WaybillResult,
};
use waybill_storage::RecordAssembler;

use crate::error::{ApiError, ApiResult};

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// PostgreSQL host
    pub host: String,
    /// PostgreSQL port
    pub port: u16,
    /// Database name
    pub dbname: String,
    /// Database user
    pub user: String,
    /// Database password
    pub password: String,
    /// Maximum pool size
    pub max_size: usize,
    /// Connection timeout
    pub timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "".to_string(),
            max_size: 16,
            timeout: Duration::from_secs(30),
        }
    }
}

impl DbConfig {
    /// Create a new database configuration from environment variables.
    ///
    /// `POSTGRES_HOST` is honored when `WAYBILL_DB_HOST` is unset.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            host: var("WAYBILL_DB_HOST")
                .or_else(|| var("POSTGRES_HOST"))
                .unwrap_or(defaults.host),
            port: var("WAYBILL_DB_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            dbname: var("WAYBILL_DB_NAME").unwrap_or(defaults.dbname),
            user: var("WAYBILL_DB_USER").unwrap_or(defaults.user),
            password: var("WAYBILL_DB_PASSWORD").unwrap_or_default(),
            max_size: var("WAYBILL_DB_POOL_SIZE")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_size),
            timeout: var("WAYBILL_DB_TIMEOUT")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
        }
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> ApiResult<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = Some(self.password.clone());

        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        let mut pool_cfg = deadpool_postgres::PoolConfig::new(self.max_size);
        pool_cfg.timeouts = Timeouts::wait_millis(self.timeout.as_millis() as u64);
        cfg.pool = Some(pool_cfg);

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| ApiError::database_error(format!("Failed to create pool: {}", e)))?;

        Ok(pool)
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

/// Any query or decode failure is a transient database error.
fn query_error(stage: &'static str) -> impl FnOnce(tokio_postgres::Error) -> WaybillError {
    move |err| {
        tracing::error!(stage, "Database error: {:?}", err);
        WaybillError::database(format!("{stage} query failed: {err}"))
    }
}

fn pool_error(err: PoolError) -> WaybillError {
    tracing::error!("Connection pool error: {:?}", err);
    match err {
        PoolError::Timeout(_) => WaybillError::database("connection pool exhausted"),
        PoolError::Closed => WaybillError::database("connection pool is closed"),
        other => WaybillError::database(format!("failed to acquire connection: {other}")),
    }
}

// ============================================================================
// DATABASE CLIENT WRAPPER
// ============================================================================

const PACKAGE_SQL: &str =
    "SELECT sno, tracking_status, estimated_delivery FROM packages WHERE sno = $1";

const EVENTS_SQL: &str = "SELECT id, date, time, status, location_id FROM tracking_details \
     WHERE sno = $1 ORDER BY date, time, id";

const RECIPIENT_SQL: &str =
    "SELECT id, name, address, phone FROM recipients WHERE sno = $1 ORDER BY id LIMIT 1";

const CURRENT_LOCATION_SQL: &str = "SELECT location_id, title, city, address FROM locations \
     WHERE location_id = (SELECT location_id FROM tracking_details WHERE sno = $1 \
     ORDER BY date DESC, time DESC, id DESC LIMIT 1)";

/// Database client that wraps a connection pool and assembles package
/// records.
#[derive(Clone)]
pub struct DbClient {
    pool: Pool,
}

impl DbClient {
    /// Create a new database client with the given pool.
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create a new database client from configuration.
    pub fn from_config(config: &DbConfig) -> ApiResult<Self> {
        let pool = config.create_pool()?;
        Ok(Self::new(pool))
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> WaybillResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(pool_error)
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&self) -> WaybillResult<()> {
        let conn = self.get_conn().await?;
        conn.simple_query("SELECT 1")
            .await
            .map_err(query_error("health check"))?;
        Ok(())
    }

    /// Number of rows in the base package table.
    pub async fn package_count(&self) -> WaybillResult<i64> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_one("SELECT COUNT(*) FROM packages", &[])
            .await
            .map_err(query_error("package count"))?;
        row.try_get(0).map_err(query_error("package count"))
    }

    /// Assemble the full record for one tracking number.
    ///
    /// Stops at the first missing part: no base row, no recipient, or no
    /// location for the latest event each yield `NotFound`.
    #[tracing::instrument(skip_all, fields(tracking_number = %tracking_number))]
    pub async fn assemble_record(
        &self,
        tracking_number: &TrackingNumber,
    ) -> WaybillResult<PackageRecord> {
        let conn = self.get_conn().await?;
        let sno = tracking_number.as_str();

        let base = conn
            .query_opt(PACKAGE_SQL, &[&sno])
            .await
            .map_err(query_error("package"))?
            .ok_or_else(|| WaybillError::not_found(tracking_number, RecordPart::Package))?;
        let status: String = base.try_get("tracking_status").map_err(query_error("package"))?;
        let estimated_delivery = base
            .try_get("estimated_delivery")
            .map_err(query_error("package"))?;

        let tracking_events = conn
            .query(EVENTS_SQL, &[&sno])
            .await
            .map_err(query_error("tracking events"))?
            .iter()
            .map(event_from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(query_error("tracking events"))?;

        let recipient = conn
            .query_opt(RECIPIENT_SQL, &[&sno])
            .await
            .map_err(query_error("recipient"))?
            .ok_or_else(|| WaybillError::not_found(tracking_number, RecordPart::Recipient))?;
        let recipient = recipient_from_row(&recipient).map_err(query_error("recipient"))?;

        let location = conn
            .query_opt(CURRENT_LOCATION_SQL, &[&sno])
            .await
            .map_err(query_error("current location"))?
            .ok_or_else(|| WaybillError::not_found(tracking_number, RecordPart::CurrentLocation))?;
        let current_location = location_from_row(&location).map_err(query_error("current location"))?;

        tracing::debug!(events = tracking_events.len(), "assembled package record");

        Ok(PackageRecord {
            tracking_number: tracking_number.clone(),
            status,
            estimated_delivery,
            tracking_events,
            recipient,
            current_location,
        })
    }
}

fn event_from_row(row: &Row) -> Result<TrackingEvent, tokio_postgres::Error> {
    Ok(TrackingEvent {
        id: row.try_get("id")?,
        date: row.try_get("date")?,
        time: row.try_get("time")?,
        status: row.try_get("status")?,
        location_id: row.try_get("location_id")?,
    })
}

fn recipient_from_row(row: &Row) -> Result<Recipient, tokio_postgres::Error> {
    Ok(Recipient {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        address: row.try_get("address")?,
        phone: row.try_get("phone")?,
    })
}

fn location_from_row(row: &Row) -> Result<Location, tokio_postgres::Error> {
    Ok(Location {
        id: row.try_get("location_id")?,
        title: row.try_get("title")?,
        city: row.try_get("city")?,
        address: row.try_get("address")?,
    })
}

#[async_trait]
impl RecordAssembler for DbClient {
    async fn fetch_record(&self, tracking_number: &TrackingNumber) -> WaybillResult<PackageRecord> {
        self.assemble_record(tracking_number).await
    }

    async fn ping(&self) -> WaybillResult<()> {
        self.health_check().await
    }
}

impl std::fmt::Debug for DbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbClient")
            .field("pool_size", &self.pool_size())
            .finish()
    }
}
