//! Phase 1: concurrent appointment lookup across all databases
//!
//! Every configured database is queried at once. Failures are isolated per
//! database: an unreachable backend or a bad query becomes an error-carrying
//! [`LookupResult`] and never aborts its siblings. The lookup waits for all
//! attempts, so the winner depends only on list order, not on which backend
//! answered first.

use futures::future::join_all;
use kiosk_common::DatabaseDescriptor;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::db::{AppointmentBackend, AppointmentRecord};
use crate::error::Error;

/// Outcome of one database's lookup attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub database: String,
    pub outcome: Result<Vec<AppointmentRecord>, String>,
}

impl LookupResult {
    pub fn is_error(&self) -> bool {
        self.outcome.is_err()
    }
}

/// First matching appointment and the database it came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub database: String,
    pub record: AppointmentRecord,
}

/// Parallel lookup executor
pub struct FanOutLookup {
    backend: Arc<dyn AppointmentBackend>,
    timeout: Duration,
}

impl FanOutLookup {
    /// Create a lookup over `backend`; each attempt is bounded by `timeout`
    pub fn new(backend: Arc<dyn AppointmentBackend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Query every database concurrently
    ///
    /// Returns one result per descriptor, in descriptor order.
    pub async fn lookup_all(
        &self,
        databases: &[DatabaseDescriptor],
        identifier: &str,
    ) -> Vec<LookupResult> {
        let attempts = databases.iter().map(|db| self.lookup_one(db, identifier));
        join_all(attempts).await
    }

    async fn lookup_one(&self, db: &DatabaseDescriptor, identifier: &str) -> LookupResult {
        let attempt = self.backend.find_appointments(db, identifier);

        let outcome = match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(records)) => {
                debug!(database = %db.name, matches = records.len(), "Lookup finished");
                Ok(records)
            }
            Ok(Err(e)) => {
                warn!(database = %db.name, error = %e, "Lookup failed");
                Err(e.to_string())
            }
            Err(_) => {
                let e = Error::Timeout(self.timeout);
                warn!(database = %db.name, error = %e, "Lookup timed out");
                Err(e.to_string())
            }
        };

        LookupResult {
            database: db.name.clone(),
            outcome,
        }
    }
}

/// Pick the first result, in list order, with at least one record
pub fn select_winner(results: &[LookupResult]) -> Option<Match> {
    results.iter().find_map(|result| match &result.outcome {
        Ok(records) => records.first().map(|record| Match {
            database: result.database.clone(),
            record: record.clone(),
        }),
        Err(_) => None,
    })
}
