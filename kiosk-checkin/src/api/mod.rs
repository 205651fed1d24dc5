//! HTTP API handlers for kiosk-checkin

pub mod checkin;
pub mod config;
pub mod error;
pub mod health;

pub use checkin::{add_digit, check_appointment, clear};
pub use config::{get_config, save_config, test_connection};
pub use error::ApiError;
pub use health::health_routes;
