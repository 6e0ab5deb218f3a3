use waybill_api::db::{DbClient, DbConfig};
use waybill_test_utils::PackageTables;

pub fn test_db_config() -> DbConfig {
    DbConfig::from_env()
}

pub fn test_db_client() -> DbClient {
    DbClient::from_config(&test_db_config()).expect("Failed to create database client")
}

/// Create the schema and replace the rows of every package in `tables`.
pub async fn seed(tables: &PackageTables) {
    let pool = test_db_config()
        .create_pool()
        .expect("Failed to create database pool");
    let mut conn = pool.get().await.expect("Failed to get connection");

    let tx = conn.transaction().await.expect("Failed to begin transaction");

    // Tests seed concurrently; serialize them for the whole transaction.
    tx.batch_execute("SELECT pg_advisory_xact_lock(7211)")
        .await
        .expect("Failed to take seed lock");
    tx.batch_execute(include_str!("../../sql/schema.sql"))
        .await
        .expect("Failed to apply schema");
    let snos: Vec<&str> = tables.packages.iter().map(|p| p.sno.as_str()).collect();

    for table in ["tracking_details", "recipients", "packages"] {
        tx.execute(
            &format!("DELETE FROM {} WHERE sno = ANY($1)", table),
            &[&snos],
        )
        .await
        .expect("Failed to clear fixture rows");
    }

    for location in &tables.locations {
        tx.execute(
            "INSERT INTO locations (location_id, title, city, address) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (location_id) DO UPDATE \
             SET title = EXCLUDED.title, city = EXCLUDED.city, address = EXCLUDED.address",
            &[&location.id, &location.title, &location.city, &location.address],
        )
        .await
        .expect("Failed to insert location");
    }

    for package in &tables.packages {
        tx.execute(
            "INSERT INTO packages (sno, tracking_status, estimated_delivery) VALUES ($1, $2, $3)",
            &[&package.sno, &package.tracking_status, &package.estimated_delivery],
        )
        .await
        .expect("Failed to insert package");
    }

    // Serial ids are assigned in insertion order, so insert by fixture id.
    let mut events: Vec<_> = tables.events.iter().collect();
    events.sort_by_key(|row| row.event.id);
    for row in events {
        tx.execute(
            "INSERT INTO tracking_details (sno, date, time, status, location_id) \
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &row.sno,
                &row.event.date,
                &row.event.time,
                &row.event.status,
                &row.event.location_id,
            ],
        )
        .await
        .expect("Failed to insert tracking event");
    }

    for row in &tables.recipients {
        tx.execute(
            "INSERT INTO recipients (sno, name, address, phone) VALUES ($1, $2, $3, $4)",
            &[
                &row.sno,
                &row.recipient.name,
                &row.recipient.address,
                &row.recipient.phone,
            ],
        )
        .await
        .expect("Failed to insert recipient");
    }

    tx.commit().await.expect("Failed to commit fixture rows");
}
