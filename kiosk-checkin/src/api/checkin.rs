//! Kiosk endpoints: digit entry and appointment check
//!
//! All three act on the buffer of the kiosk named by the `X-Kiosk-Id` header.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

use super::error::ApiError;
use crate::checkin::{ArrivalStatus, CheckInOutcome};
use crate::session::KioskId;
use crate::AppState;

const ENTER_IDENTIFIER_MESSAGE: &str = "Please enter your social security number";
const GENERIC_ERROR_MESSAGE: &str = "An error occurred. Please try again later.";

/// Request body for POST /api/addDigit
#[derive(Debug, Deserialize)]
pub struct AddDigitRequest {
    #[serde(default)]
    pub digit: Value,
}

/// Current formatted buffer
#[derive(Debug, Serialize)]
pub struct SsnResponse {
    pub ssn: String,
}

/// Response for POST /api/checkAppointment
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckAppointmentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub has_arrived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub db_name: Option<String>,
}

impl CheckAppointmentResponse {
    fn failure(message: &'static str) -> Self {
        Self {
            success: false,
            message: Some(message),
            ..Default::default()
        }
    }

    fn not_found() -> Self {
        Self {
            success: false,
            code: Some("NO_APPOINTMENT"),
            ..Default::default()
        }
    }
}

/// Accept `5` or `"5"`; anything else is rejected
fn parse_digit(value: &Value) -> Option<u8> {
    match value {
        Value::Number(n) => n.as_u64().filter(|d| *d <= 9).map(|d| d as u8),
        Value::String(s) => {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c.to_digit(10).map(|d| d as u8),
                _ => None,
            }
        }
        _ => None,
    }
}

/// POST /api/addDigit
///
/// Appends one digit; an 11th digit is ignored. Returns the formatted buffer.
pub async fn add_digit(
    State(state): State<AppState>,
    kiosk: KioskId,
    payload: Result<Json<AddDigitRequest>, JsonRejection>,
) -> Result<Json<SsnResponse>, ApiError> {
    let Json(request) = payload?;
    let digit = parse_digit(&request.digit).ok_or_else(|| {
        ApiError::BadRequest(format!("Invalid digit: {}", request.digit))
    })?;

    let ssn = state.sessions.append_digit(&kiosk, digit)?;
    Ok(Json(SsnResponse { ssn }))
}

/// POST /api/clear
pub async fn clear(
    State(state): State<AppState>,
    kiosk: KioskId,
) -> Result<Json<SsnResponse>, ApiError> {
    let ssn = state.sessions.clear(&kiosk)?;
    Ok(Json(SsnResponse { ssn }))
}

/// POST /api/checkAppointment
///
/// Looks the entered identifier up in every database and marks the first
/// match as arrived. The kiosk's buffer is cleared whatever the outcome.
pub async fn check_appointment(
    State(state): State<AppState>,
    kiosk: KioskId,
) -> Json<CheckAppointmentResponse> {
    let identifier = match state.sessions.formatted(&kiosk) {
        Ok(identifier) => identifier,
        Err(e) => {
            error!(kiosk = %kiosk, error = %e, "Error reading session");
            return Json(CheckAppointmentResponse::failure(GENERIC_ERROR_MESSAGE));
        }
    };

    if identifier.is_empty() {
        return Json(CheckAppointmentResponse::failure(ENTER_IDENTIFIER_MESSAGE));
    }

    let outcome = state.checkin.check_in(&identifier).await;

    if let Err(e) = state.sessions.clear(&kiosk) {
        error!(kiosk = %kiosk, error = %e, "Error clearing session");
    }

    let response = match outcome {
        CheckInOutcome::Found {
            database,
            record,
            arrival,
        } => {
            let marked = matches!(arrival, ArrivalStatus::Marked { rows } if rows > 0);
            let has_arrived = marked || record.has_arrived();
            info!(kiosk = %kiosk, database = %database, has_arrived, "Check-in complete");

            CheckAppointmentResponse {
                success: true,
                code: Some("APPOINTMENT_FOUND"),
                patient_name: Some(record.display_name),
                appointment_time: record.start.map(|t| t.format("%H:%M").to_string()),
                has_arrived: Some(has_arrived),
                db_name: Some(database),
                ..Default::default()
            }
        }
        CheckInOutcome::NotFound => CheckAppointmentResponse::not_found(),
    };

    Json(response)
}
