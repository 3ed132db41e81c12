//! Error types for dbhelper.
//!
//! Every failure surfaced by the configuration layer, the resolvers, sessions
//! and batches is a [`DbError`] variant. Configuration and resolution errors
//! are never retried here; transaction failures are reported only after a
//! rollback has been attempted.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration file list not found: {}", path.display())]
    ConfigNotFound { path: PathBuf },

    #[error("Active database detail file not found: {message}")]
    ConfigFileMissing {
        message: String,
        path: Option<PathBuf>,
    },

    #[error("Invalid configuration in {}: {message}", path.display())]
    InvalidConfig { path: PathBuf, message: String },

    #[error("Database '{name}' is not configured")]
    DatabaseNotConfigured { name: String },

    #[error("Database '{name}' has no connection string configured")]
    ConnectionStringMissing { name: String },

    #[error("Failed to decrypt connection string for '{name}': {message}")]
    DecryptionFailure { name: String, message: String },

    #[error("Failed to encrypt connection string: {message}")]
    EncryptionFailure { message: String },

    #[error("Cannot resolve provider '{provider}' for database '{name}'")]
    ProviderResolutionFailure { name: String, provider: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Failed to begin transaction: {message}")]
    TransactionBeginFailure { message: String },

    #[error(
        "Batch rolled back: command #{index} affected no rows ({sql}); {} command(s) had run",
        affected.len()
    )]
    ZeroRowRollback {
        /// Position of the offending command in the batch.
        index: usize,
        sql: String,
        /// Affected-row counts of every command executed so far, the
        /// offending one included. Informational only: all of it was rolled back.
        affected: Vec<u64>,
    },

    #[error("Commit failed: {message}")]
    CommitFailure {
        message: String,
        /// Present when the follow-up rollback failed as well.
        rollback_error: Option<String>,
    },

    #[error("Database error: {message}")]
    Execution {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
    },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount {
        expected: &'static str,
        actual: usize,
    },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },
}

impl DbError {
    /// Create a config-list-not-found error.
    pub fn config_not_found(path: impl AsRef<Path>) -> Self {
        Self::ConfigNotFound {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a detail-file-missing error.
    pub fn config_file_missing(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::ConfigFileMissing {
            message: message.into(),
            path,
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_config(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn database_not_configured(name: impl Into<String>) -> Self {
        Self::DatabaseNotConfigured { name: name.into() }
    }

    pub fn connection_string_missing(name: impl Into<String>) -> Self {
        Self::ConnectionStringMissing { name: name.into() }
    }

    pub fn decryption_failure(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DecryptionFailure {
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn encryption_failure(message: impl Into<String>) -> Self {
        Self::EncryptionFailure {
            message: message.into(),
        }
    }

    pub fn provider_resolution(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self::ProviderResolutionFailure {
            name: name.into(),
            provider: provider.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn begin_failure(message: impl Into<String>) -> Self {
        Self::TransactionBeginFailure {
            message: message.into(),
        }
    }

    pub fn commit_failure(message: impl Into<String>, rollback_error: Option<String>) -> Self {
        Self::CommitFailure {
            message: message.into(),
            rollback_error,
        }
    }

    /// Create an execution error with optional SQL state.
    pub fn execution(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Execution {
            message: message.into(),
            sql_state,
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn unexpected_row_count(expected: &'static str, actual: usize) -> Self {
        Self::UnexpectedRowCount { expected, actual }
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::ConfigNotFound { .. } => {
                Some("Place DbConfig.json next to the executable or pass its path explicitly")
            }
            Self::ProviderResolutionFailure { .. } => {
                Some("Register a factory for this identifier before building the context")
            }
            _ => None,
        }
    }

    /// Check if this error belongs to the configuration/resolution stage.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. }
                | Self::ConfigFileMissing { .. }
                | Self::InvalidConfig { .. }
                | Self::DatabaseNotConfigured { .. }
                | Self::ConnectionStringMissing { .. }
                | Self::DecryptionFailure { .. }
                | Self::ProviderResolutionFailure { .. }
        )
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::execution(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::unexpected_row_count("at least one", 0),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::execution(format!("Column not found: {}", col), None)
            }
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::execution(format!("Failed to decode column {}: {}", index, source), None)
            }
            sqlx::Error::Decode(source) => {
                DbError::execution(format!("Decode error: {}", source), None)
            }
            sqlx::Error::WorkerCrashed => DbError::connection(
                "Database worker crashed",
                "Reopen the session",
            ),
            _ => DbError::execution(format!("Unknown database error: {}", err), None),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::connection("refused", "Check that the server is running");
        assert_eq!(err.suggestion(), Some("Check that the server is running"));
        assert!(DbError::execution("syntax", None).suggestion().is_none());
    }

    #[test]
    fn test_zero_row_rollback_display() {
        let err = DbError::ZeroRowRollback {
            index: 1,
            sql: "DELETE FROM t WHERE id = 9".to_string(),
            affected: vec![1, 0],
        };
        let msg = err.to_string();
        assert!(msg.contains("#1"));
        assert!(msg.contains("DELETE FROM t"));
        assert!(msg.contains("2 command(s)"));
    }

    #[test]
    fn test_configuration_classification() {
        assert!(DbError::config_not_found("DbConfig.json").is_configuration());
        assert!(DbError::provider_resolution("main", "nope").is_configuration());
        assert!(!DbError::begin_failure("locked").is_configuration());
        assert!(!DbError::timeout("execute", 30).is_configuration());
    }

    #[test]
    fn test_config_not_found_shows_path() {
        let err = DbError::config_not_found("/etc/app/DbConfig.json");
        assert!(err.to_string().contains("/etc/app/DbConfig.json"));
    }
}
