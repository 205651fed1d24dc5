//! Clinic check-in kiosk (kiosk-checkin) - Main entry point
//!
//! Serves the kiosk keypad UI and its JSON API, plus the admin page used to
//! edit the list of clinic databases.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use kiosk_common::config::{load_toml_config, resolve_config_path, ConfigOverrides, ServiceConfig};
use kiosk_common::EnvFileStore;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kiosk_checkin::db::SqlBackend;
use kiosk_checkin::{build_router, AppState};

const SECRET_KEY_VAR: &str = "SECRET_KEY";

/// Command-line arguments for kiosk-checkin
#[derive(Parser, Debug)]
#[command(name = "kiosk-checkin")]
#[command(about = "Clinic check-in kiosk service")]
#[command(version)]
struct Args {
    /// TOML config file
    #[arg(short, long, env = "KIOSK_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long = "bind", env = "KIOSK_BIND_ADDR")]
    bind_addr: Option<String>,

    /// Env file holding the database list
    #[arg(long, env = "KIOSK_ENV_FILE")]
    env_file: Option<PathBuf>,

    /// Directory with index.html, admin.html and static assets
    #[arg(long, env = "KIOSK_PUBLIC_DIR")]
    public_dir: Option<PathBuf>,

    /// Per-database query timeout in milliseconds
    #[arg(long, env = "KIOSK_QUERY_TIMEOUT_MS")]
    query_timeout_ms: Option<u64>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, env = "KIOSK_LOG_LEVEL")]
    log_level: Option<String>,

    /// Key for password encryption in the env file
    #[arg(long, env = "SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let toml = load_toml_config(config_path.as_deref()).context("Failed to load config file")?;
    let config = ServiceConfig::resolve(
        ConfigOverrides {
            bind_addr: args.bind_addr,
            port: args.port,
            env_file: args.env_file,
            public_dir: args.public_dir,
            query_timeout_ms: args.query_timeout_ms,
            log_level: args.log_level,
        },
        toml,
    );

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        "Starting clinic check-in kiosk (kiosk-checkin) v{}",
        env!("CARGO_PKG_VERSION")
    );
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("Config file: none (defaults)"),
    }
    info!("Env file: {}", config.env_file.display());
    info!("Public dir: {}", config.public_dir.display());
    info!("Query timeout: {}ms", config.query_timeout.as_millis());

    let keyless = EnvFileStore::new(&config.env_file, None);
    let secret_key = match args.secret_key.filter(|s| !s.is_empty()) {
        Some(key) => Some(key),
        None => keyless
            .read_value(SECRET_KEY_VAR)
            .context("Failed to read env file")?
            .filter(|s| !s.is_empty()),
    };
    if secret_key.is_none() {
        warn!("{} not set: passwords are stored in plaintext", SECRET_KEY_VAR);
    }

    let store = EnvFileStore::new(&config.env_file, secret_key);
    let databases = match store.load() {
        Ok(databases) => databases,
        Err(e) => {
            error!("Failed to load database configuration: {}", e);
            return Err(e).context("Failed to load database configuration");
        }
    };
    info!("✓ {} database(s) configured", databases.len());
    for db in &databases {
        info!("  {} ({}, {})", db.name, db.driver, db.sql_server);
    }

    let state = AppState::new(
        databases,
        Arc::new(SqlBackend),
        store,
        config.query_timeout,
    );
    let app = build_router(state, &config.public_dir);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("kiosk-checkin listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
