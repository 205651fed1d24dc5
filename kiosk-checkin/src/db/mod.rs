//! Access to the clinic appointment databases
//!
//! Every operation opens its own connection, uses it and closes it before
//! returning. No connection outlives a call, so an error on any path cannot
//! leak one.
//!
//! Schema expected on each backend:
//! - `BokanirDagsins` view: `DisplayedName`, `Start`, `PatientHasArrived`,
//!   `DisplayedPersonalNo`
//! - `BookingObject`: `Actor_ID`, `Start`, `Status`, `PatientHasArrived`
//! - `MainActor`: `ActorID`, `DisplayedPersonalNo`

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime};
use kiosk_common::{DatabaseDescriptor, Driver};

use crate::error::Result;

pub mod mssql;
pub mod sqlite;

/// `BookingObject.Status` of an active booking
pub const BOOKED_STATUS: i32 = 1;

/// Format used for the arrival marker and window bounds
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Appointment row as read from `BokanirDagsins`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentRecord {
    pub display_name: String,
    pub start: Option<NaiveDateTime>,
    /// Arrival marker; `None` or empty until the patient checks in
    pub arrived_at: Option<String>,
}

impl AppointmentRecord {
    pub fn has_arrived(&self) -> bool {
        self.arrived_at.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// Timestamp to write and the start-time window a booking must fall in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrivalMark {
    pub at: NaiveDateTime,
    pub window_start: NaiveDateTime,
    pub window_end: NaiveDateTime,
}

impl ArrivalMark {
    /// Mark at `now` (UTC), eligible bookings start within one day either side
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            at: now,
            window_start: now - Duration::days(1),
            window_end: now + Duration::days(1),
        }
    }

    pub fn now() -> Self {
        Self::at(chrono::Utc::now().naive_utc())
    }

    pub fn at_text(&self) -> String {
        self.at.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Operations the check-in workflow needs from a clinic database
#[async_trait]
pub trait AppointmentBackend: Send + Sync {
    /// Appointments whose personal number equals `identifier`
    async fn find_appointments(
        &self,
        db: &DatabaseDescriptor,
        identifier: &str,
    ) -> Result<Vec<AppointmentRecord>>;

    /// Set the arrival marker on eligible bookings; returns rows affected
    ///
    /// Only bookings starting inside the mark's window, with
    /// [`BOOKED_STATUS`] and no marker yet are touched.
    async fn mark_arrived(
        &self,
        db: &DatabaseDescriptor,
        identifier: &str,
        mark: &ArrivalMark,
    ) -> Result<u64>;

    /// Open a connection and run a trivial query
    async fn test_connection(&self, db: &DatabaseDescriptor) -> Result<()>;
}

/// Backend that dispatches on the descriptor's driver
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlBackend;

#[async_trait]
impl AppointmentBackend for SqlBackend {
    async fn find_appointments(
        &self,
        db: &DatabaseDescriptor,
        identifier: &str,
    ) -> Result<Vec<AppointmentRecord>> {
        match db.driver {
            Driver::Mssql => mssql::find_appointments(db, identifier).await,
            Driver::Sqlite => sqlite::find_appointments(db, identifier).await,
        }
    }

    async fn mark_arrived(
        &self,
        db: &DatabaseDescriptor,
        identifier: &str,
        mark: &ArrivalMark,
    ) -> Result<u64> {
        match db.driver {
            Driver::Mssql => mssql::mark_arrived(db, identifier, mark).await,
            Driver::Sqlite => sqlite::mark_arrived(db, identifier, mark).await,
        }
    }

    async fn test_connection(&self, db: &DatabaseDescriptor) -> Result<()> {
        match db.driver {
            Driver::Mssql => mssql::test_connection(db).await,
            Driver::Sqlite => sqlite::test_connection(db).await,
        }
    }
}
