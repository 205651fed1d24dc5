//! Tests for the env-file descriptor store
//!
//! Tests cover:
//! - Save/load round trip (backslashes, quotes, options, driver)
//! - Password encryption at rest
//! - Legacy key spelling and unquoted values written by the setup script
//! - Skipping incomplete or undecryptable groups
//! - Keys outside the database groups survive a save

use kiosk_common::crypto;
use kiosk_common::descriptor::{ConnectionOptions, DatabaseDescriptor, Driver};
use kiosk_common::EnvFileStore;
use tempfile::TempDir;

fn opus() -> DatabaseDescriptor {
    DatabaseDescriptor {
        name: "Opus".to_string(),
        sql_server: "192.168.40.6\\opus".to_string(),
        sql_database: "opus".to_string(),
        sql_user: "sa".to_string(),
        sql_password: "Opus2008".to_string(),
        sql_trust_server_certificate: true,
        options: ConnectionOptions::default(),
        driver: Driver::Mssql,
    }
}

fn saga() -> DatabaseDescriptor {
    DatabaseDescriptor {
        name: "Saga".to_string(),
        sql_server: "clinic-db,14330".to_string(),
        sql_database: "saga".to_string(),
        sql_user: "kiosk".to_string(),
        sql_password: "it's $ecret".to_string(),
        sql_trust_server_certificate: false,
        options: ConnectionOptions {
            encrypt: true,
            trust_server_certificate: false,
            enable_arith_abort: false,
        },
        driver: Driver::Mssql,
    }
}

#[test]
fn test_missing_file_is_empty_list() {
    let dir = TempDir::new().unwrap();
    let store = EnvFileStore::new(dir.path().join(".env"), None);
    assert!(store.load().unwrap().is_empty());
}

#[test]
fn test_round_trip_plaintext() {
    let dir = TempDir::new().unwrap();
    let store = EnvFileStore::new(dir.path().join(".env"), None);

    let list = vec![opus(), saga()];
    store.save(&list).unwrap();

    let content = std::fs::read_to_string(store.path()).unwrap();
    assert!(content.starts_with("DATABASE_COUNT=2\n"));
    assert!(content.contains("DB1_SQL_SERVER='192.168.40.6\\opus'"));
    assert!(content.contains("DB1_SQL_PASSWORD='Opus2008'"));

    let loaded = store.load().unwrap();
    assert_eq!(loaded, list);
}

#[test]
fn test_round_trip_encrypted() {
    let dir = TempDir::new().unwrap();
    let store = EnvFileStore::new(dir.path().join(".env"), Some("kiosk-secret".to_string()));

    store.save(&[opus()]).unwrap();

    let content = std::fs::read_to_string(store.path()).unwrap();
    assert!(content.contains("DB1_SQL_PASSWORD='ENC:"));
    assert!(!content.contains("Opus2008"));

    let loaded = store.load().unwrap();
    assert_eq!(loaded[0].sql_password, "Opus2008");

    // Without the secret the group cannot be used
    let keyless = EnvFileStore::new(store.path(), None);
    assert!(keyless.load().unwrap().is_empty());
}

#[test]
fn test_already_encrypted_password_not_double_encrypted() {
    let dir = TempDir::new().unwrap();
    let store = EnvFileStore::new(dir.path().join(".env"), Some("k".to_string()));

    let mut db = opus();
    db.sql_password = crypto::encrypt("Opus2008", "k").unwrap();
    store.save(&[db]).unwrap();

    assert_eq!(store.load().unwrap()[0].sql_password, "Opus2008");
}

#[test]
fn test_legacy_setup_keys_and_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".env");
    // As the setup script writes it: unquoted, no trailing newline
    std::fs::write(
        &path,
        "DATABASE_COUNT=1\n\
         DB1_NAME=Opus\n\
         DB1_SQLSERVER=192.168.40.6\\opus\n\
         DB1_SQLDATABASE=opus\n\
         DB1_SQLUSER=sa\n\
         DB1_SQLPASSWORD=Opus2008\n\
         DB1_SQLTRUSTSERVERCERTIFICATE=false",
    )
    .unwrap();

    let loaded = EnvFileStore::new(&path, None).load().unwrap();
    assert_eq!(loaded.len(), 1);

    let db = &loaded[0];
    assert_eq!(db.sql_server, "192.168.40.6\\opus");
    assert_eq!(db.sql_user, "sa");
    assert_eq!(db.sql_password, "Opus2008");
    assert!(!db.sql_trust_server_certificate);
    assert!(!db.options.encrypt);
    assert!(db.options.enable_arith_abort);
    assert_eq!(db.driver, Driver::Mssql);
}

#[test]
fn test_unquoted_values_are_literal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".env");
    std::fs::write(
        &path,
        "HOME_DIR=/home/kiosk\n\
         DATABASE_COUNT=1\n\
         DB1_NAME=Saga\n\
         DB1_SQL_SERVER=clinic\\saga\n\
         DB1_SQL_DATABASE=saga\n\
         DB1_SQL_USER=kiosk\n\
         DB1_SQL_PASSWORD=Pa$word1\\n$HOME_DIR\n\
         DB1_SQL_TRUST_SERVER_CERTIFICATE=true\n",
    )
    .unwrap();

    let loaded = EnvFileStore::new(&path, None).load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].sql_server, "clinic\\saga");
    assert_eq!(loaded[0].sql_password, "Pa$word1\\n$HOME_DIR");
}

#[test]
fn test_unquoted_unrelated_keys_survive_save_verbatim() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".env");
    std::fs::write(
        &path,
        "SECRET_KEY=k3y$with\\slash\nDATABASE_COUNT=0\n",
    )
    .unwrap();
    let store = EnvFileStore::new(&path, None);

    store.save(&[opus()]).unwrap();

    assert_eq!(
        store.read_value("SECRET_KEY").unwrap().as_deref(),
        Some("k3y$with\\slash")
    );
    assert_eq!(store.load().unwrap(), vec![opus()]);
}

#[test]
fn test_incomplete_group_skipped() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".env");
    std::fs::write(
        &path,
        "DATABASE_COUNT=2\n\
         DB1_NAME=Broken\n\
         DB1_SQL_SERVER=srv\n\
         DB2_NAME=Saga\n\
         DB2_SQL_SERVER=srv\n\
         DB2_SQL_DATABASE=saga\n\
         DB2_SQL_USER=kiosk\n\
         DB2_SQL_PASSWORD=pw\n\
         DB2_DRIVER=sqlite\n",
    )
    .unwrap();

    let loaded = EnvFileStore::new(&path, None).load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name, "Saga");
    assert_eq!(loaded[0].driver, Driver::Sqlite);
}

#[test]
fn test_save_replaces_previous_list() {
    let dir = TempDir::new().unwrap();
    let store = EnvFileStore::new(dir.path().join("conf").join(".env"), None);

    store.save(&[opus(), saga()]).unwrap();
    store.save(&[saga()]).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].name, "Saga");
}

#[test]
fn test_save_keeps_unrelated_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(".env");
    std::fs::write(
        &path,
        "PORT=3100\nSECRET_KEY=kiosk-secret\nDATABASE_COUNT=1\nDB1_NAME=Old\n",
    )
    .unwrap();
    let store = EnvFileStore::new(&path, None);

    store.save(&[opus()]).unwrap();

    assert_eq!(store.read_value("PORT").unwrap().as_deref(), Some("3100"));
    assert_eq!(
        store.read_value("SECRET_KEY").unwrap().as_deref(),
        Some("kiosk-secret")
    );
    assert_eq!(store.read_value("DB1_NAME").unwrap().as_deref(), Some("Opus"));
    assert_eq!(store.load().unwrap(), vec![opus()]);
}

#[test]
fn test_plaintext_that_looks_encrypted_is_encrypted() {
    let dir = TempDir::new().unwrap();
    let store = EnvFileStore::new(dir.path().join(".env"), Some("kiosk-secret".to_string()));

    let mut db = opus();
    db.sql_password = "ENC:not-a-token".to_string();
    store.save(&[db]).unwrap();

    let content = std::fs::read_to_string(store.path()).unwrap();
    assert!(!content.contains("ENC:not-a-token"));
    assert_eq!(store.load().unwrap()[0].sql_password, "ENC:not-a-token");
}

#[test]
fn test_save_leaves_no_temp_files() {
    let dir = TempDir::new().unwrap();
    let store = EnvFileStore::new(dir.path().join(".env"), None);

    store.save(&[opus()]).unwrap();
    store.save(&[saga()]).unwrap();

    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec![".env"]);
}
