//! Persisted descriptor list in env-file form
//!
//! Layout (one numbered key group per database):
//!
//! ```text
//! DATABASE_COUNT=2
//! DB1_NAME='Opus'
//! DB1_SQL_SERVER='192.168.40.6\opus'
//! DB1_SQL_DATABASE='opus'
//! DB1_SQL_USER='sa'
//! DB1_SQL_PASSWORD='ENC:<iv>:<ciphertext>'
//! DB1_SQL_TRUST_SERVER_CERTIFICATE='true'
//! ...
//! ```
//!
//! The file is read with `dotenvy` without touching the process environment.
//! The setup script and older service versions write values unquoted
//! (`DB1_SQLSERVER=192.168.40.6\opus`); such values are taken literally, with
//! no escape processing and no `$VAR` substitution, before dotenvy sees them.
//! Saves rewrite every database key; other keys in the file (`SECRET_KEY`,
//! `PORT`, ...) are carried over unchanged.

use crate::crypto;
use crate::descriptor::{ConnectionOptions, DatabaseDescriptor, Driver};
use crate::Result;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

const COUNT_KEY: &str = "DATABASE_COUNT";

/// Env-file backed store for the descriptor list
#[derive(Debug, Clone)]
pub struct EnvFileStore {
    path: PathBuf,
    secret_key: Option<String>,
}

impl EnvFileStore {
    /// Create a store for `path`; passwords are encrypted on save when a
    /// non-empty secret key is given
    pub fn new(path: impl Into<PathBuf>, secret_key: Option<String>) -> Self {
        Self {
            path: path.into(),
            secret_key: secret_key.filter(|s| !s.is_empty()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read a single key from the file; `None` when the file or key is absent
    pub fn read_value(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .read_entries()?
            .into_iter()
            .find_map(|(k, v)| (k == key).then_some(v)))
    }

    fn read_entries(&self) -> Result<Vec<(String, String)>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        let normalized: String = raw
            .lines()
            .map(|line| quote_bare_value(line) + "\n")
            .collect();

        let mut entries = Vec::new();
        for item in dotenvy::from_read_iter(Cursor::new(normalized)) {
            entries.push(item?);
        }
        Ok(entries)
    }

    /// Load the descriptor list
    ///
    /// A missing file is an empty list. Groups with missing required keys or
    /// undecryptable passwords are skipped and logged.
    pub fn load(&self) -> Result<Vec<DatabaseDescriptor>> {
        if !self.path.exists() {
            warn!(path = %self.path.display(), "Configuration file not found, no databases configured");
            return Ok(Vec::new());
        }

        let values: HashMap<String, String> = self.read_entries()?.into_iter().collect();

        let count = match values.get(COUNT_KEY) {
            Some(raw) => raw.trim().parse::<usize>().unwrap_or_else(|_| {
                warn!(value = %raw, "Invalid {}, treating as 0", COUNT_KEY);
                0
            }),
            None => {
                warn!(path = %self.path.display(), "{} missing from configuration", COUNT_KEY);
                0
            }
        };

        let mut descriptors = Vec::with_capacity(count);
        for index in 1..=count {
            match self.read_group(&values, index) {
                Some(db) => descriptors.push(db),
                None => continue,
            }
        }

        info!(
            path = %self.path.display(),
            configured = count,
            loaded = descriptors.len(),
            "Loaded database configuration"
        );
        Ok(descriptors)
    }

    fn read_group(
        &self,
        values: &HashMap<String, String>,
        index: usize,
    ) -> Option<DatabaseDescriptor> {
        let prefix = format!("DB{}_", index);
        // Current spelling first, then the one the setup script writes.
        let get = |keys: &[&str]| -> Option<String> {
            keys.iter()
                .find_map(|k| values.get(&format!("{}{}", prefix, k)))
                .cloned()
        };

        let (Some(name), Some(server), Some(database), Some(user), Some(password)) = (
            get(&["NAME"]),
            get(&["SQL_SERVER", "SQLSERVER"]),
            get(&["SQL_DATABASE", "SQLDATABASE"]),
            get(&["SQL_USER", "SQLUSER"]),
            get(&["SQL_PASSWORD", "SQLPASSWORD"]),
        ) else {
            warn!(group = %prefix, "Incomplete database group skipped");
            return None;
        };

        let password = match crypto::decrypt(&password, self.secret_key.as_deref()) {
            Ok(p) => p,
            Err(e) => {
                error!(database = %name, error = %e, "Cannot decrypt password, database skipped");
                return None;
            }
        };

        let driver = match get(&["DRIVER"]).map(|d| d.parse::<Driver>()) {
            Some(Ok(driver)) => driver,
            Some(Err(e)) => {
                error!(database = %name, error = %e, "Invalid driver, database skipped");
                return None;
            }
            None => Driver::default(),
        };

        let defaults = ConnectionOptions::default();
        let trust = parse_flag(
            get(&["SQL_TRUST_SERVER_CERTIFICATE", "SQLTRUSTSERVERCERTIFICATE"]),
            true,
        );

        debug!(database = %name, driver = %driver, "Read database group {}", index);

        Some(DatabaseDescriptor {
            name,
            sql_server: server,
            sql_database: database,
            sql_user: user,
            sql_password: password,
            sql_trust_server_certificate: trust,
            options: ConnectionOptions {
                encrypt: parse_flag(get(&["ENCRYPT"]), defaults.encrypt),
                trust_server_certificate: trust,
                enable_arith_abort: parse_flag(
                    get(&["ENABLE_ARITH_ABORT"]),
                    defaults.enable_arith_abort,
                ),
            },
            driver,
        })
    }

    /// Replace the persisted list
    ///
    /// The new content is written to a temp file in the same directory and
    /// persisted over the old one, so readers never see a half-written file.
    pub fn save(&self, descriptors: &[DatabaseDescriptor]) -> Result<()> {
        let preserved: Vec<_> = self
            .read_entries()?
            .into_iter()
            .filter(|(key, _)| !is_descriptor_key(key))
            .collect();
        let content = self.render(&preserved, descriptors);

        let parent = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                parent
            }
            None => Path::new("."),
        };

        // Dropped (and removed) on any error before persist
        let mut tmp = NamedTempFile::new_in(parent)?;
        tmp.write_all(content.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;

        info!(
            path = %self.path.display(),
            databases = descriptors.len(),
            encrypted = self.secret_key.is_some(),
            "Saved database configuration"
        );
        Ok(())
    }

    fn render(&self, preserved: &[(String, String)], descriptors: &[DatabaseDescriptor]) -> String {
        let mut lines: Vec<String> = preserved
            .iter()
            .map(|(key, value)| format!("{}={}", key, quote_value(value)))
            .collect();
        lines.push(format!("{}={}", COUNT_KEY, descriptors.len()));

        for (i, db) in descriptors.iter().enumerate() {
            let prefix = format!("DB{}_", i + 1);
            let password = self.stored_password(db);

            let mut push = |key: &str, value: &str| {
                lines.push(format!("{}{}={}", prefix, key, quote_value(value)));
            };
            push("NAME", &db.name);
            push("SQL_SERVER", &db.sql_server);
            push("SQL_DATABASE", &db.sql_database);
            push("SQL_USER", &db.sql_user);
            push("SQL_PASSWORD", &password);
            push(
                "SQL_TRUST_SERVER_CERTIFICATE",
                &db.trusts_server_certificate().to_string(),
            );
            push("DRIVER", db.driver.as_str());
            push("ENCRYPT", &db.options.encrypt.to_string());
            push("ENABLE_ARITH_ABORT", &db.options.enable_arith_abort.to_string());
        }

        let mut content = lines.join("\n");
        content.push('\n');
        content
    }

    fn stored_password(&self, db: &DatabaseDescriptor) -> String {
        let Some(secret) = self.secret_key.as_deref() else {
            return db.sql_password.clone();
        };
        // Tokens made with this key (e.g. by kiosk-encrypt) are kept; anything
        // else, including plaintext that merely starts with `ENC:`, is encrypted.
        if crypto::is_encrypted(&db.sql_password)
            && crypto::decrypt(&db.sql_password, Some(secret)).is_ok()
        {
            return db.sql_password.clone();
        }
        match crypto::encrypt(&db.sql_password, secret) {
            Ok(token) => token,
            Err(e) => {
                error!(database = %db.name, error = %e, "Failed to encrypt password, storing plaintext");
                db.sql_password.clone()
            }
        }
    }
}

/// Rewrite `KEY=value` with an unquoted value into its quoted equivalent
///
/// The value runs to the end of the line, or to a `#` preceded by whitespace,
/// and is trimmed. Quoted values, comments and blank lines pass through.
fn quote_bare_value(line: &str) -> String {
    let trimmed = line.trim_start();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return line.to_string();
    }
    let Some((key, rest)) = line.split_once('=') else {
        return line.to_string();
    };
    let value = rest.trim_start();
    if value.starts_with('\'') || value.starts_with('"') {
        return line.to_string();
    }

    let end = value
        .char_indices()
        .find(|&(i, c)| c == '#' && value[..i].ends_with(char::is_whitespace))
        .map(|(i, _)| i)
        .unwrap_or(value.len());

    format!("{}={}", key.trim_end(), quote_value(value[..end].trim()))
}

/// `DATABASE_COUNT` or any `DB<n>_*` key
fn is_descriptor_key(key: &str) -> bool {
    if key == COUNT_KEY {
        return true;
    }
    key.strip_prefix("DB")
        .and_then(|rest| rest.split_once('_'))
        .is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
}

fn parse_flag(raw: Option<String>, default: bool) -> bool {
    match raw.as_deref().map(|s| s.trim().to_ascii_lowercase()) {
        Some(v) if v == "true" || v == "1" || v == "yes" => true,
        Some(v) if v == "false" || v == "0" || v == "no" => false,
        _ => default,
    }
}

/// Quote a value for the env file
///
/// Single quotes keep backslashes and `$` literal; values that themselves
/// contain a single quote fall back to double quotes with escaping.
fn quote_value(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{}'", value);
    }
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '\\' | '"' | '$' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}
