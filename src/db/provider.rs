//! Driver abstraction and the provider registry.
//!
//! A provider identifier from the detail file (`DbProviderFactory`) names a
//! [`ConnectionFactory`] registered here at startup. Factories open
//! [`DbConnection`]s; sessions never talk to a driver any other way.

use crate::db::driver::SqlxFactory;
use crate::error::DbResult;
use crate::models::{Command, DatabaseType, ResultSet};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identifier of the built-in SQLite factory.
pub const SQLITE_PROVIDER: &str = "sqlx-sqlite";
/// Identifier of the built-in PostgreSQL factory.
pub const POSTGRES_PROVIDER: &str = "sqlx-postgres";
/// Identifier of the built-in MySQL factory.
pub const MYSQL_PROVIDER: &str = "sqlx-mysql";

/// Provider registry shared between the context, the configuration check
/// and the provider resolver.
pub type SharedProviders = Arc<RwLock<ProviderRegistry>>;

/// One open physical connection.
///
/// Every call blocks until the driver returns. `timeout` bounds a single
/// statement.
pub trait DbConnection: Send {
    fn begin(&mut self) -> DbResult<()>;

    fn commit(&mut self) -> DbResult<()>;

    fn rollback(&mut self) -> DbResult<()>;

    /// Run a statement and return the affected-row count.
    fn execute(&mut self, command: &Command, timeout: Duration) -> DbResult<u64>;

    /// Run a statement and return every row it produced.
    fn query(&mut self, command: &Command, timeout: Duration) -> DbResult<ResultSet>;

    /// Release the connection. Errors are reported but the connection is gone either way.
    fn close(self: Box<Self>) -> DbResult<()>;
}

/// A provider handle: creates physical connections for one engine.
pub trait ConnectionFactory: Send + Sync + fmt::Debug {
    fn database_type(&self) -> DatabaseType;

    fn connect(&self, connection_string: &str) -> DbResult<Box<dyn DbConnection>>;
}

/// Startup-time map from provider identifiers to factories.
///
/// Identifiers are matched case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Arc<dyn ConnectionFactory>>,
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the sqlx-backed SQLite, PostgreSQL and MySQL factories.
    ///
    /// All three share one background runtime.
    pub fn with_builtin() -> DbResult<Self> {
        let runtime = crate::db::driver::build_runtime()?;
        let mut registry = Self::new();
        registry.register(
            SQLITE_PROVIDER,
            SqlxFactory::new(DatabaseType::SQLite, runtime.clone()),
        );
        registry.register(
            POSTGRES_PROVIDER,
            SqlxFactory::new(DatabaseType::PostgreSQL, runtime.clone()),
        );
        registry.register(MYSQL_PROVIDER, SqlxFactory::new(DatabaseType::MySQL, runtime));
        Ok(registry)
    }

    /// Register (or replace) a factory under `identifier`.
    pub fn register<F>(&mut self, identifier: impl AsRef<str>, factory: F) -> &mut Self
    where
        F: ConnectionFactory + 'static,
    {
        self.register_arc(identifier, Arc::new(factory))
    }

    pub fn register_arc(
        &mut self,
        identifier: impl AsRef<str>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> &mut Self {
        self.factories
            .insert(identifier.as_ref().trim().to_ascii_lowercase(), factory);
        self
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn ConnectionFactory>> {
        self.factories
            .get(&identifier.trim().to_ascii_lowercase())
            .cloned()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.factories
            .contains_key(&identifier.trim().to_ascii_lowercase())
    }

    /// Wrap the registry for sharing.
    pub fn into_shared(self) -> SharedProviders {
        Arc::new(RwLock::new(self))
    }

    /// Registered identifiers, sorted.
    pub fn identifiers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }
}
