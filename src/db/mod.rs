//! Database access layer.
//!
//! This module provides:
//! - The provider registry and the driver traits it hands out
//! - The built-in sqlx drivers (SQLite, PostgreSQL, MySQL)
//! - Two-level configuration loading
//! - Fill-once provider and connection-string resolution
//! - Sessions with explicit transactions
//! - Atomic write batches

pub mod batch;
pub mod driver;
#[macro_use]
pub mod macros;
pub mod params;
pub mod provider;
pub mod registry;
pub mod resolver;
pub mod session;
pub mod types;

pub use batch::{BatchExecutor, BatchSummary, StepOutcome, execute_step};
pub use provider::{
    ConnectionFactory, DbConnection, MYSQL_PROVIDER, POSTGRES_PROVIDER, ProviderRegistry,
    SQLITE_PROVIDER, SharedProviders,
};
pub use registry::ConfigRegistry;
pub use resolver::{ConnectionStringResolver, ProviderResolver};
pub use session::{DisposePolicy, Session, SessionInfo, SessionOptions, SessionState};
