//! Unit tests for bootstrap configuration
//!
//! Tests cover:
//! - Priority order: overrides > TOML file > compiled defaults
//! - Config file path resolution (CLI, KIOSK_CONFIG)
//! - Missing / malformed config files
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate KIOSK_CONFIG are marked with #[serial].

use kiosk_common::config::{
    load_toml_config, resolve_config_path, ConfigOverrides, ServiceConfig, TomlConfig,
    CONFIG_ENV_VAR, DEFAULT_PORT,
};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

fn write_toml(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write toml");
    file
}

#[test]
fn test_defaults_when_nothing_configured() {
    let config = ServiceConfig::default();

    assert_eq!(config.bind_addr, "0.0.0.0");
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.env_file, PathBuf::from(".env"));
    assert_eq!(config.public_dir, PathBuf::from("public"));
    assert_eq!(config.query_timeout, Duration::from_secs(15));
    assert_eq!(config.log_level, "info");
    assert_eq!(config.listen_addr(), "0.0.0.0:3000");
}

#[test]
fn test_toml_values_override_defaults() {
    let file = write_toml(
        r#"
port = 8081
env_file = "/etc/clinic-kiosk/databases.env"
query_timeout_ms = 2500

[logging]
level = "debug"
"#,
    );

    let toml = load_toml_config(Some(file.path())).expect("should parse");
    let config = ServiceConfig::resolve(ConfigOverrides::default(), toml);

    assert_eq!(config.port, 8081);
    assert_eq!(config.env_file, PathBuf::from("/etc/clinic-kiosk/databases.env"));
    assert_eq!(config.query_timeout, Duration::from_millis(2500));
    assert_eq!(config.log_level, "debug");
    // Not in the file: compiled default
    assert_eq!(config.bind_addr, "0.0.0.0");
}

#[test]
fn test_overrides_beat_toml() {
    let toml = TomlConfig {
        port: Some(8081),
        bind_addr: Some("127.0.0.1".to_string()),
        ..Default::default()
    };
    let overrides = ConfigOverrides {
        port: Some(9000),
        ..Default::default()
    };

    let config = ServiceConfig::resolve(overrides, toml);
    assert_eq!(config.port, 9000);
    assert_eq!(config.bind_addr, "127.0.0.1");
}

#[test]
fn test_no_config_file_gives_defaults() {
    let toml = load_toml_config(None).expect("no file is fine");
    assert!(toml.port.is_none());
    assert!(toml.logging.level.is_none());
}

#[test]
fn test_missing_named_config_file_is_error() {
    let result = load_toml_config(Some(Path::new("/nonexistent/clinic-kiosk/config.toml")));
    assert!(result.is_err());
}

#[test]
fn test_malformed_config_file_is_error() {
    let file = write_toml("port = \"not a number\"");
    assert!(load_toml_config(Some(file.path())).is_err());
}

#[test]
#[serial]
fn test_cli_path_wins_over_env_var() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(Some(Path::new("/tmp/from-cli.toml")));
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-cli.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_var_path_used_without_cli() {
    env::set_var(CONFIG_ENV_VAR, "/tmp/from-env.toml");

    let resolved = resolve_config_path(None);
    assert_eq!(resolved, Some(PathBuf::from("/tmp/from-env.toml")));

    env::remove_var(CONFIG_ENV_VAR);
}
