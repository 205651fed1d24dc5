//! # Clinic Kiosk Common Library
//!
//! Shared code for the check-in kiosk service:
//! - Error type
//! - Bootstrap configuration loading
//! - Database descriptors and their validation
//! - Env-file persistence of the descriptor list
//! - At-rest password cipher

pub mod config;
pub mod crypto;
pub mod descriptor;
pub mod env_store;
pub mod error;

pub use descriptor::{ConnectionOptions, DatabaseDescriptor, Driver};
pub use env_store::EnvFileStore;
pub use error::{Error, Result};
