//! Error types for kiosk-checkin
//!
//! Per-database failures are converted into values by the lookup layer; these
//! variants describe what went wrong for the log and for admin responses.

use std::time::Duration;
use thiserror::Error;

/// Main error type for the check-in service
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite driver errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// SQL Server (TDS) driver errors
    #[error("SQL Server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    /// Network I/O errors while connecting
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Operation exceeded the per-database timeout
    #[error("Timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Configuration, validation and cipher errors from kiosk-common
    #[error(transparent)]
    Common(#[from] kiosk_common::Error),

    /// Other errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the check-in Error
pub type Result<T> = std::result::Result<T, Error>;
