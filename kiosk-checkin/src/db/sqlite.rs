//! SQLite backend (sqlx)
//!
//! `sqlDatabase` is the database file path. The file must already exist; a
//! missing file is a connection error, never a fresh empty database.

use chrono::NaiveDateTime;
use kiosk_common::DatabaseDescriptor;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Row};
use tracing::{debug, warn};

use super::{AppointmentRecord, ArrivalMark, BOOKED_STATUS, TIMESTAMP_FORMAT};
use crate::error::Result;

const FIND_APPOINTMENTS_SQL: &str = "\
SELECT DisplayedName, Start, PatientHasArrived
FROM BokanirDagsins
WHERE DisplayedPersonalNo = ?";

const MARK_ARRIVED_SQL: &str = "\
UPDATE BookingObject
SET PatientHasArrived = ?1
WHERE Actor_ID IN (SELECT ActorID FROM MainActor WHERE DisplayedPersonalNo = ?2)
  AND Start >= ?3
  AND Start <= ?4
  AND Status = ?5
  AND (PatientHasArrived IS NULL OR PatientHasArrived = '')";

async fn connect(db: &DatabaseDescriptor) -> Result<SqliteConnection> {
    let conn = SqliteConnectOptions::new()
        .filename(&db.sql_database)
        .create_if_missing(false)
        .connect()
        .await?;
    debug!(database = %db.name, path = %db.sql_database, "Opened SQLite database");
    Ok(conn)
}

async fn close(db: &DatabaseDescriptor, conn: SqliteConnection) {
    if let Err(e) = conn.close().await {
        warn!(database = %db.name, error = %e, "Error closing SQLite connection");
    }
}

fn read_record(row: &SqliteRow) -> Result<AppointmentRecord> {
    Ok(AppointmentRecord {
        display_name: row
            .try_get::<Option<String>, _>("DisplayedName")?
            .unwrap_or_default(),
        start: row.try_get::<Option<NaiveDateTime>, _>("Start")?,
        arrived_at: row.try_get::<Option<String>, _>("PatientHasArrived")?,
    })
}

pub async fn find_appointments(
    db: &DatabaseDescriptor,
    identifier: &str,
) -> Result<Vec<AppointmentRecord>> {
    let mut conn = connect(db).await?;

    let result = sqlx::query(FIND_APPOINTMENTS_SQL)
        .bind(identifier)
        .fetch_all(&mut conn)
        .await
        .map_err(Into::into)
        .and_then(|rows| rows.iter().map(read_record).collect::<Result<Vec<_>>>());

    close(db, conn).await;
    result
}

pub async fn mark_arrived(
    db: &DatabaseDescriptor,
    identifier: &str,
    mark: &ArrivalMark,
) -> Result<u64> {
    let mut conn = connect(db).await?;

    let result = sqlx::query(MARK_ARRIVED_SQL)
        .bind(mark.at_text())
        .bind(identifier)
        .bind(mark.window_start.format(TIMESTAMP_FORMAT).to_string())
        .bind(mark.window_end.format(TIMESTAMP_FORMAT).to_string())
        .bind(BOOKED_STATUS)
        .execute(&mut conn)
        .await
        .map(|done| done.rows_affected())
        .map_err(Into::into);

    close(db, conn).await;
    result
}

pub async fn test_connection(db: &DatabaseDescriptor) -> Result<()> {
    let mut conn = connect(db).await?;

    let result = sqlx::query("SELECT 1")
        .execute(&mut conn)
        .await
        .map(|_| ())
        .map_err(Into::into);

    close(db, conn).await;
    result
}
