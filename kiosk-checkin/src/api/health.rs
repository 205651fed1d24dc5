//! Liveness and configuration summary for the kiosk service

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// `GET /health` body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `unconfigured` while the database list is empty
    pub status: &'static str,
    pub module: &'static str,
    pub version: &'static str,
    /// Databases a check-in would query
    pub databases: usize,
    /// Kiosks with digits entered
    pub kiosks: usize,
}

/// GET /health
///
/// Never touches the clinic databases; `/api/test-connection` does that.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let databases = state.databases.read().await.len();
    let kiosks = state.sessions.session_count().unwrap_or(0);

    Json(HealthResponse {
        status: if databases == 0 { "unconfigured" } else { "ok" },
        module: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        databases,
        kiosks,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
