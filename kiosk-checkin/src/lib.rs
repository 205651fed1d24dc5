//! kiosk-checkin library - clinic check-in kiosk service
//!
//! A patient types their kennitala on the kiosk keypad; the service looks it
//! up in every configured clinic database at once, reports the first match
//! and marks that booking as arrived. Admin endpoints edit the database list.

use axum::Router;
use kiosk_common::{DatabaseDescriptor, EnvFileStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

pub mod api;
pub mod checkin;
pub mod db;
pub mod error;
pub mod session;

use checkin::CheckInService;
use db::AppointmentBackend;
use session::SessionRegistry;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Current database list; replaced wholesale by admin saves
    pub databases: Arc<RwLock<Vec<DatabaseDescriptor>>>,
    /// Digit buffers, one per kiosk
    pub sessions: Arc<SessionRegistry>,
    pub backend: Arc<dyn AppointmentBackend>,
    /// Env-file persistence for the database list
    pub store: Arc<EnvFileStore>,
    pub checkin: Arc<CheckInService>,
    /// Bound on each database call
    pub query_timeout: Duration,
}

impl AppState {
    /// Create new application state
    pub fn new(
        databases: Vec<DatabaseDescriptor>,
        backend: Arc<dyn AppointmentBackend>,
        store: EnvFileStore,
        query_timeout: Duration,
    ) -> Self {
        let databases = Arc::new(RwLock::new(databases));
        let checkin = CheckInService::new(databases.clone(), backend.clone(), query_timeout);
        Self {
            databases,
            sessions: Arc::new(SessionRegistry::new()),
            backend,
            store: Arc::new(store),
            checkin: Arc::new(checkin),
            query_timeout,
        }
    }
}

/// Build application router
///
/// `/` and `/admin` serve `index.html` and `admin.html` from `public_dir`;
/// any other unknown path is looked up there as a static file.
pub fn build_router(state: AppState, public_dir: &Path) -> Router {
    use axum::routing::{get, get_service, post};
    use tower_http::cors::CorsLayer;
    use tower_http::services::{ServeDir, ServeFile};
    use tower_http::trace::TraceLayer;

    let kiosk = Router::new()
        .route("/api/addDigit", post(api::add_digit))
        .route("/api/clear", post(api::clear))
        .route("/api/checkAppointment", post(api::check_appointment));

    let admin = Router::new()
        .route("/api/config", get(api::get_config).post(api::save_config))
        .route("/api/test-connection", post(api::test_connection));

    let pages = Router::new()
        .route(
            "/",
            get_service(ServeFile::new(public_dir.join("index.html"))),
        )
        .route(
            "/admin",
            get_service(ServeFile::new(public_dir.join("admin.html"))),
        )
        .fallback_service(ServeDir::new(public_dir));

    Router::new()
        .merge(kiosk)
        .merge(admin)
        .merge(api::health_routes())
        .merge(pages)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
