//! Check-in workflow
//!
//! Two phases:
//! 1. Read-only fan-out lookup over every configured database ([`fanout`]).
//! 2. A single conditional write marking arrival, against the winning
//!    database only ([`arrival`]).
//!
//! Phase 2 re-resolves the winner's descriptor by name from the current list
//! and opens its own connection. Its failure is logged and reported in the
//! outcome, but the appointment still counts as found.

pub mod arrival;
pub mod fanout;

use kiosk_common::DatabaseDescriptor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::db::{AppointmentBackend, AppointmentRecord};
pub use arrival::{ArrivalCommit, ArrivalStatus};
pub use fanout::{select_winner, FanOutLookup, LookupResult, Match};

/// Result of a full check-in cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInOutcome {
    Found {
        database: String,
        record: AppointmentRecord,
        arrival: ArrivalStatus,
    },
    NotFound,
}

/// Runs lookup then arrival marking against the shared descriptor list
pub struct CheckInService {
    databases: Arc<RwLock<Vec<DatabaseDescriptor>>>,
    lookup: FanOutLookup,
    commit: ArrivalCommit,
}

impl CheckInService {
    pub fn new(
        databases: Arc<RwLock<Vec<DatabaseDescriptor>>>,
        backend: Arc<dyn AppointmentBackend>,
        timeout: Duration,
    ) -> Self {
        Self {
            databases,
            lookup: FanOutLookup::new(backend.clone(), timeout),
            commit: ArrivalCommit::new(backend, timeout),
        }
    }

    /// Look up `identifier` everywhere and mark the winner's booking arrived
    pub async fn check_in(&self, identifier: &str) -> CheckInOutcome {
        // Phase 1 works on a snapshot; admin saves may swap the list meanwhile.
        let snapshot = self.databases.read().await.clone();
        info!(
            identifier = %identifier,
            databases = snapshot.len(),
            "Checking appointment"
        );

        let results = self.lookup.lookup_all(&snapshot, identifier).await;

        let Some(winner) = select_winner(&results) else {
            let errors: Vec<_> = results
                .iter()
                .filter_map(|r| r.outcome.as_ref().err().map(|e| (r.database.as_str(), e)))
                .collect();
            if !errors.is_empty() {
                warn!(
                    failed = errors.len(),
                    "No appointment found; database errors: {:?}",
                    errors
                );
            }
            info!(identifier = %identifier, "No appointment found");
            return CheckInOutcome::NotFound;
        };

        info!(
            identifier = %identifier,
            database = %winner.database,
            "Appointment found"
        );

        // Phase 2: re-resolve by name against the current list.
        let descriptor = {
            let current = self.databases.read().await;
            kiosk_common::descriptor::find_by_name(&current, &winner.database).cloned()
        };

        let arrival = match descriptor {
            Some(db) => self.commit.mark(&db, identifier).await,
            None => {
                warn!(
                    database = %winner.database,
                    "Winning database no longer configured, arrival not marked"
                );
                ArrivalStatus::Failed(format!(
                    "database '{}' no longer configured",
                    winner.database
                ))
            }
        };

        CheckInOutcome::Found {
            database: winner.database,
            record: winner.record,
            arrival,
        }
    }
}
