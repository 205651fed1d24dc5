//! Phase 2: mark the patient as arrived on the winning database
//!
//! Best effort. The update only touches bookings that start within a day of
//! now, are booked (status 1) and carry no marker yet, so repeating it is
//! harmless and stale or cancelled bookings are never marked.

use kiosk_common::DatabaseDescriptor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::db::{AppointmentBackend, ArrivalMark};
use crate::error::Error;

/// What happened to the arrival marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrivalStatus {
    /// Update ran; `rows` is 0 when no booking was eligible (e.g. already marked)
    Marked { rows: u64 },
    /// Update could not be run
    Failed(String),
}

/// Conditional arrival update with its own connection and timeout
pub struct ArrivalCommit {
    backend: Arc<dyn AppointmentBackend>,
    timeout: Duration,
}

impl ArrivalCommit {
    pub fn new(backend: Arc<dyn AppointmentBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    pub async fn mark(&self, db: &DatabaseDescriptor, identifier: &str) -> ArrivalStatus {
        self.mark_at(db, identifier, ArrivalMark::now()).await
    }

    pub async fn mark_at(
        &self,
        db: &DatabaseDescriptor,
        identifier: &str,
        mark: ArrivalMark,
    ) -> ArrivalStatus {
        let update = self.backend.mark_arrived(db, identifier, &mark);

        match tokio::time::timeout(self.timeout, update).await {
            Ok(Ok(rows)) => {
                info!(
                    database = %db.name,
                    rows,
                    arrived_at = %mark.at_text(),
                    "Arrival marked"
                );
                ArrivalStatus::Marked { rows }
            }
            Ok(Err(e)) => {
                error!(database = %db.name, error = %e, "Error marking arrival");
                ArrivalStatus::Failed(e.to_string())
            }
            Err(_) => {
                let e = Error::Timeout(self.timeout);
                error!(database = %db.name, error = %e, "Error marking arrival");
                ArrivalStatus::Failed(e.to_string())
            }
        }
    }
}
