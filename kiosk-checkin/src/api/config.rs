//! Admin endpoints: database configuration and connection test

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use kiosk_common::descriptor::validate_descriptors;
use kiosk_common::DatabaseDescriptor;
use serde::Serialize;
use tracing::{error, info, warn};

use super::error::ApiError;
use crate::error::Error;
use crate::AppState;

/// `{ success, message? }`
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// GET /api/config
pub async fn get_config(State(state): State<AppState>) -> Json<Vec<DatabaseDescriptor>> {
    Json(state.databases.read().await.clone())
}

/// POST /api/config
///
/// The whole list is validated before anything is written. The file is
/// persisted first; the in-memory list only changes once that succeeded.
pub async fn save_config(
    State(state): State<AppState>,
    payload: Result<Json<Vec<DatabaseDescriptor>>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(descriptors) = payload?;
    if let Err(e) = validate_descriptors(&descriptors) {
        warn!(error = %e, "Rejected database configuration");
        let message = match e {
            kiosk_common::Error::InvalidInput(msg) => msg,
            other => other.to_string(),
        };
        return Err(ApiError::BadRequest(message));
    }

    // Held across the write so concurrent saves apply in order.
    let mut current = state.databases.write().await;

    if let Err(e) = state.store.save(&descriptors) {
        error!(
            path = %state.store.path().display(),
            error = %e,
            "Error saving database configuration"
        );
        return Err(ApiError::Internal("Failed to save configurations".to_string()));
    }

    *current = descriptors;
    info!(databases = current.len(), "Database configuration updated");

    Ok(Json(StatusResponse {
        success: true,
        message: None,
    }))
}

/// POST /api/test-connection
///
/// Opens one connection with the submitted descriptor and runs `SELECT 1`.
pub async fn test_connection(
    State(state): State<AppState>,
    payload: Result<Json<DatabaseDescriptor>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(descriptor) = payload?;
    let attempt = state.backend.test_connection(&descriptor);
    let result = match tokio::time::timeout(state.query_timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout(state.query_timeout)),
    };

    let response = match result {
        Ok(()) => {
            info!(database = %descriptor.name, server = %descriptor.sql_server, "Connection test passed");
            StatusResponse {
                success: true,
                message: None,
            }
        }
        Err(e) => {
            warn!(
                database = %descriptor.name,
                server = %descriptor.sql_server,
                error = %e,
                "Connection test failed"
            );
            StatusResponse {
                success: false,
                message: Some(e.to_string()),
            }
        }
    };

    Ok(Json(response))
}
