//! Bootstrap configuration and config file resolution
//!
//! Priority order for every setting:
//! 1. Command-line argument / environment variable (highest priority)
//! 2. TOML config file
//! 3. Compiled default (fallback)
//!
//! Database descriptors are not part of the bootstrap configuration; they
//! live in the env-file store (see [`crate::env_store`]).

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming the TOML config file
pub const CONFIG_ENV_VAR: &str = "KIOSK_CONFIG";

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_PUBLIC_DIR: &str = "public";
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Settings read from the TOML config file
///
/// Every field is optional; absent fields fall through to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub bind_addr: Option<String>,
    pub port: Option<u16>,
    /// Env-file holding the database descriptors
    pub env_file: Option<PathBuf>,
    /// Directory with the kiosk and admin front-end
    pub public_dir: Option<PathBuf>,
    /// Per-database query timeout
    pub query_timeout_ms: Option<u64>,
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: Option<String>,
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_addr: Option<String>,
    pub port: Option<u16>,
    pub env_file: Option<PathBuf>,
    pub public_dir: Option<PathBuf>,
    pub query_timeout_ms: Option<u64>,
    pub log_level: Option<String>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub bind_addr: String,
    pub port: u16,
    pub env_file: PathBuf,
    pub public_dir: PathBuf,
    pub query_timeout: Duration,
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::resolve(ConfigOverrides::default(), TomlConfig::default())
    }
}

impl ServiceConfig {
    /// Merge overrides over the TOML file over compiled defaults
    pub fn resolve(overrides: ConfigOverrides, toml: TomlConfig) -> Self {
        Self {
            bind_addr: overrides
                .bind_addr
                .or(toml.bind_addr)
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            port: overrides.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            env_file: overrides
                .env_file
                .or(toml.env_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ENV_FILE)),
            public_dir: overrides
                .public_dir
                .or(toml.public_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PUBLIC_DIR)),
            query_timeout: Duration::from_millis(
                overrides
                    .query_timeout_ms
                    .or(toml.query_timeout_ms)
                    .unwrap_or(DEFAULT_QUERY_TIMEOUT_MS),
            ),
            log_level: overrides
                .log_level
                .or(toml.logging.level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
        }
    }

    /// Socket address string for the HTTP listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Locate the TOML config file
///
/// 1. Explicit path (command line)
/// 2. `KIOSK_CONFIG` environment variable
/// 3. `<config_dir>/clinic-kiosk/config.toml`, only if it exists
///
/// Explicit paths are returned even when missing so loading reports them.
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    dirs::config_dir()
        .map(|d| d.join("clinic-kiosk").join("config.toml"))
        .filter(|p| p.exists())
}

/// Load the TOML config file
///
/// No path means no file: defaults apply. A named file that cannot be read or
/// parsed is an error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let Some(path) = path else {
        info!("No config file found, using defaults");
        return Ok(TomlConfig::default());
    };

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
    })?;

    let config: TomlConfig = toml::from_str(&content)?;
    if config.port == Some(0) {
        warn!(path = %path.display(), "Port 0 in config file: an ephemeral port will be used");
    }

    info!(path = %path.display(), "Loaded config file");
    Ok(config)
}
