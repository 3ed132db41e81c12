//! Configuration-related data models.
//!
//! This module defines the two JSON documents that describe the configured
//! databases: the config-file list (`DbConfig`) and the detail file
//! (`DbDetail`) referenced by its active entry.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;
use url::Url;

/// Engine kind of a configured database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    #[default]
    SQLite,
    SqlServer,
    Oracle,
    /// Any engine without a built-in driver.
    Other,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
            Self::SqlServer => "SqlServer",
            Self::Oracle => "Oracle",
            Self::Other => "Other",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for DatabaseType {
    type Err = std::convert::Infallible;

    /// Case-insensitive; unknown engine names map to [`DatabaseType::Other`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" | "postgresqlclient" | "pg" => Self::PostgreSQL,
            "mysql" | "mariadb" | "mysqlclient" => Self::MySQL,
            "sqlite" | "sqlite3" => Self::SQLite,
            "sqlserver" | "mssql" | "sqlclient" => Self::SqlServer,
            "oracle" | "oracleclient" => Self::Oracle,
            _ => Self::Other,
        };
        Ok(kind)
    }
}

impl Serialize for DatabaseType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.display_name())
    }
}

impl<'de> Deserialize<'de> for DatabaseType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(s.parse().unwrap_or(Self::Other))
    }
}

/// One candidate detail file listed in the config-file list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigFileEntry {
    pub file_name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default, rename = "Describe")]
    pub description: String,
}

impl ConfigFileEntry {
    pub fn new(file_name: impl Into<String>, active: bool) -> Self {
        Self {
            file_name: file_name.into(),
            active,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// The config-file list document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbConfig {
    #[serde(default)]
    pub config_files: Vec<ConfigFileEntry>,
}

impl DbConfig {
    /// First entry marked active, in file order.
    pub fn active_file(&self) -> Option<&ConfigFileEntry> {
        self.config_files.iter().find(|c| c.active)
    }
}

/// One named database in the detail file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DatabaseEntry {
    pub name: String,
    #[serde(default)]
    pub database_type: DatabaseType,
    /// Provider identifier looked up in the provider registry.
    #[serde(rename = "DbProviderFactory")]
    pub provider: String,
    /// Contains sensitive data - never log
    #[serde(default)]
    pub connection_string: String,
    #[serde(default, rename = "Encrypt")]
    pub encrypted: bool,
    #[serde(default, rename = "Describe")]
    pub description: String,
}

impl DatabaseEntry {
    pub fn new(
        name: impl Into<String>,
        database_type: DatabaseType,
        provider: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            database_type,
            provider: provider.into(),
            connection_string: connection_string.into(),
            encrypted: false,
            description: String::new(),
        }
    }

    /// Mark the connection string as ciphertext.
    pub fn encrypted(mut self, encrypted: bool) -> Self {
        self.encrypted = encrypted;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Name comparison under [`normalize_name`].
    pub fn is_named(&self, name: &str) -> bool {
        normalize_name(&self.name) == normalize_name(name)
    }

    /// Engine implied by the connection string when it disagrees with the
    /// declared `DatabaseType`. Encrypted strings are not inspected.
    pub fn conflicting_engine(&self) -> Option<DatabaseType> {
        if self.encrypted {
            return None;
        }
        DatabaseType::from_connection_string(&self.connection_string)
            .filter(|implied| *implied != self.database_type)
    }

    /// Get a display-safe version of the connection string (credentials masked).
    pub fn masked_connection_string(&self) -> String {
        if self.encrypted {
            return "<encrypted>".to_string();
        }
        mask_connection_string(&self.connection_string)
    }
}

/// Canonical form of a database name: surrounding whitespace removed,
/// lowercased. Lookups, the duplicate check and the resolver caches all
/// compare names in this form.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Mask the password of a URL-style connection string. Key/value strings
/// have their `password`/`pwd` values replaced.
pub fn mask_connection_string(connection_string: &str) -> String {
    if let Ok(mut url) = Url::parse(connection_string) {
        if url.password().is_some() && url.set_password(Some("****")).is_ok() {
            return url.to_string();
        }
        return connection_string.to_string();
    }

    connection_string
        .split(';')
        .map(|pair| match pair.split_once('=') {
            Some((key, _))
                if key.trim().eq_ignore_ascii_case("password")
                    || key.trim().eq_ignore_ascii_case("pwd") =>
            {
                format!("{}=****", key)
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// The detail document listing every configured database.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DbDetail {
    #[serde(default)]
    pub databases: Vec<DatabaseEntry>,
}

impl DbDetail {
    /// Find an entry by name, ignoring case.
    pub fn find(&self, name: &str) -> Option<&DatabaseEntry> {
        self.databases.iter().find(|db| db.is_named(name))
    }

    /// Name of the first entry whose normalized name repeats an earlier one.
    pub fn duplicate_name(&self) -> Option<&str> {
        self.databases.iter().enumerate().find_map(|(i, db)| {
            self.databases[..i]
                .iter()
                .any(|prev| prev.is_named(&db.name))
                .then_some(db.name.as_str())
        })
    }
}

/// Render a config-file list document.
pub fn generate_config_file(config_files: &[ConfigFileEntry]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&DbConfig {
        config_files: config_files.to_vec(),
    })
}

/// Render a database detail document.
pub fn generate_detail_file(databases: &[DatabaseEntry]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&DbDetail {
        databases: databases.to_vec(),
    })
}
