//! Database descriptors: one per configured clinic backend
//!
//! The JSON form mirrors what the admin page edits (camelCase keys). Missing
//! fields deserialize to empty values so that [`validate_descriptors`] can
//! name them instead of failing at the JSON layer.

use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;

/// SQL driver used to reach a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// Microsoft SQL Server over TDS
    #[default]
    Mssql,
    /// Local SQLite file; `sqlDatabase` holds the file path
    Sqlite,
}

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Driver::Mssql => "mssql",
            Driver::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Driver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "mssql" | "sqlserver" => Ok(Driver::Mssql),
            "sqlite" => Ok(Driver::Sqlite),
            other => Err(Error::InvalidInput(format!("unknown driver '{}'", other))),
        }
    }
}

/// Connection options applied when opening a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionOptions {
    pub encrypt: bool,
    pub trust_server_certificate: bool,
    pub enable_arith_abort: bool,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            encrypt: false,
            trust_server_certificate: true,
            enable_arith_abort: true,
        }
    }
}

/// A configured SQL backend's connection parameters and options
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseDescriptor {
    #[serde(deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub sql_server: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub sql_database: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub sql_user: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub sql_password: String,
    #[serde(deserialize_with = "null_as_false")]
    pub sql_trust_server_certificate: bool,
    pub options: ConnectionOptions,
    pub driver: Driver,
}

/// `null` reads as an empty string, so validation reports it as missing
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_default())
}

impl DatabaseDescriptor {
    /// Certificate trust is granted by either the top-level flag or the option
    pub fn trusts_server_certificate(&self) -> bool {
        self.sql_trust_server_certificate || self.options.trust_server_certificate
    }

    /// Names of required fields that are empty, in admin-form order
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.sql_server.trim().is_empty() {
            missing.push("sqlServer");
        }
        if self.sql_database.trim().is_empty() {
            missing.push("sqlDatabase");
        }
        if self.sql_user.trim().is_empty() {
            missing.push("sqlUser");
        }
        if self.sql_password.is_empty() {
            missing.push("sqlPassword");
        }
        missing
    }
}

// Passwords stay out of logs.
impl fmt::Debug for DatabaseDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseDescriptor")
            .field("name", &self.name)
            .field("driver", &self.driver)
            .field("sql_server", &self.sql_server)
            .field("sql_database", &self.sql_database)
            .field("sql_user", &self.sql_user)
            .field("sql_password", &"***")
            .field("sql_trust_server_certificate", &self.sql_trust_server_certificate)
            .field("options", &self.options)
            .finish()
    }
}

/// Validate a complete descriptor list before anything is persisted
///
/// Returns the first problem found: a descriptor with empty required fields,
/// or a name used twice.
pub fn validate_descriptors(descriptors: &[DatabaseDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();

    for (index, db) in descriptors.iter().enumerate() {
        let missing = db.missing_fields();
        if !missing.is_empty() {
            let label = if db.name.trim().is_empty() {
                format!("database #{}", index + 1)
            } else {
                format!("'{}'", db.name)
            };
            return Err(Error::InvalidInput(format!(
                "Missing required fields in database configuration {}: {}",
                label,
                missing.join(", ")
            )));
        }

        if !seen.insert(db.name.as_str()) {
            return Err(Error::InvalidInput(format!(
                "Duplicate database name in configuration: '{}'",
                db.name
            )));
        }
    }

    Ok(())
}

/// Look a descriptor up by name
pub fn find_by_name<'a>(
    descriptors: &'a [DatabaseDescriptor],
    name: &str,
) -> Option<&'a DatabaseDescriptor> {
    descriptors.iter().find(|db| db.name == name)
}
