//! Configuration handling for the dbhelper CLI.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use crate::context::ContextOptions;
use crate::db::registry::DEFAULT_CONFIG_FILE;
use crate::db::session::DisposePolicy;
use crate::models::{DEFAULT_COMMAND_TIMEOUT_SECS, MAX_COMMAND_TIMEOUT_SECS};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Name of the detail file written by `init`.
pub const DEFAULT_DETAIL_FILE: &str = "DbDetail.json";

/// Subcommands of the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum CliCommand {
    /// List the databases of the active detail file
    List,

    /// Open a connection to a configured database and run a trivial query
    Check {
        /// Configured database name (case-insensitive)
        name: String,
    },

    /// Run a JSON batch file atomically against a configured database
    Batch {
        /// Configured database name (case-insensitive)
        name: String,
        /// JSON array of {"sql", "params", "timeout_secs", "require_nonzero_rows"}
        file: PathBuf,
    },

    /// Write a starter DbConfig.json and DbDetail.json into a directory
    Init {
        dir: PathBuf,
        /// Overwrite existing files
        #[arg(long)]
        force: bool,
    },
}

/// Configuration for the dbhelper CLI.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dbhelper",
    about = "Inspect configured databases and run atomic write batches",
    version,
    author
)]
pub struct Config {
    /// Path of the config-file list
    #[arg(
        short,
        long,
        value_name = "PATH",
        default_value = DEFAULT_CONFIG_FILE,
        env = "DBHELPER_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Fallback directory for configuration files (default: executable directory)
    #[arg(long, value_name = "DIR", env = "DBHELPER_BASE_DIR", global = true)]
    pub base_dir: Option<PathBuf>,

    /// Default command timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_COMMAND_TIMEOUT_SECS,
        env = "DBHELPER_COMMAND_TIMEOUT",
        global = true
    )]
    pub command_timeout: u64,

    /// What to do with an open transaction when a session is closed
    #[arg(
        long,
        value_enum,
        default_value = "rollback",
        env = "DBHELPER_DISPOSE",
        global = true
    )]
    pub dispose: DisposePolicy,

    /// Load configurations that name unknown providers (they fail on use instead)
    #[arg(long, env = "DBHELPER_LENIENT_PROVIDERS", global = true)]
    pub lenient_providers: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, env = "DBHELPER_LOG_LEVEL", global = true)]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DBHELPER_JSON_LOGS", global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: CliCommand,
}

impl Config {
    /// Get the command timeout as a Duration.
    pub fn command_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.command_timeout.clamp(1, MAX_COMMAND_TIMEOUT_SECS))
    }

    /// Library options for the context built by the CLI.
    pub fn context_options(&self) -> ContextOptions {
        ContextOptions {
            config_path: self.config.clone(),
            base_dir: self.base_dir.clone(),
            command_timeout: self.command_timeout_duration(),
            dispose_policy: self.dispose,
            strict_providers: !self.lenient_providers,
        }
    }
}
