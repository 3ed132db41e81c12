//! Data models for dbhelper.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{
    ConfigFileEntry, DatabaseEntry, DatabaseType, DbConfig, DbDetail, generate_config_file,
    generate_detail_file, mask_connection_string, normalize_name,
};
pub use query::{
    BatchCommand, Command, CommandKind, DEFAULT_COMMAND_TIMEOUT_SECS, DbValue, Field,
    MAX_COMMAND_TIMEOUT_SECS, ResultSet, Row,
};
