//! The database context.
//!
//! A [`DbContext`] is built once at startup and passed by reference (or in
//! an `Arc`) to whatever needs database access. It owns the configuration
//! registry, the provider registry, both resolvers and the optional cipher.
//! Building a new context is the way to pick up configuration changes.

use crate::db::batch::{BatchExecutor, BatchSummary};
use crate::db::provider::{ConnectionFactory, ProviderRegistry, SharedProviders};
use crate::db::registry::{ConfigRegistry, DEFAULT_CONFIG_FILE};
use crate::db::resolver::{ConnectionStringResolver, ProviderResolver};
use crate::db::session::{DisposePolicy, Session, SessionOptions};
use crate::error::{DbError, DbResult};
use crate::models::{
    BatchCommand, Command, DEFAULT_COMMAND_TIMEOUT_SECS, DatabaseEntry, DbValue, Row,
};
use crate::security::{Cipher, KeyPair};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Library-level settings of a [`DbContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
    /// Path of the config-file list.
    pub config_path: PathBuf,
    /// Fallback directory for configuration files. `None` uses the directory
    /// of the running executable.
    pub base_dir: Option<PathBuf>,
    /// Default timeout for commands that do not set their own.
    pub command_timeout: Duration,
    pub dispose_policy: DisposePolicy,
    /// Fail the configuration load when an entry names an unknown provider.
    pub strict_providers: bool,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            base_dir: None,
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            dispose_policy: DisposePolicy::default(),
            strict_providers: true,
        }
    }
}

impl ContextOptions {
    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            command_timeout: self.command_timeout,
            dispose_policy: self.dispose_policy,
        }
    }
}

/// Builder for [`DbContext`].
pub struct DbContextBuilder {
    options: ContextOptions,
    builtin_providers: bool,
    providers: Vec<(String, Arc<dyn ConnectionFactory>)>,
    cipher: Option<Arc<dyn Cipher>>,
    keys: Option<KeyPair>,
}

impl DbContextBuilder {
    fn new() -> Self {
        Self {
            options: ContextOptions::default(),
            builtin_providers: true,
            providers: Vec::new(),
            cipher: None,
            keys: None,
        }
    }

    pub fn options(mut self, options: ContextOptions) -> Self {
        self.options = options;
        self
    }

    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.options.config_path = path.into();
        self
    }

    pub fn base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.options.base_dir = Some(dir.into());
        self
    }

    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    pub fn dispose_policy(mut self, policy: DisposePolicy) -> Self {
        self.options.dispose_policy = policy;
        self
    }

    pub fn strict_providers(mut self, strict: bool) -> Self {
        self.options.strict_providers = strict;
        self
    }

    /// Leave out the sqlx-backed SQLite, PostgreSQL and MySQL factories.
    pub fn without_builtin_providers(mut self) -> Self {
        self.builtin_providers = false;
        self
    }

    /// Register a factory under `identifier`, replacing a built-in one of the
    /// same name.
    pub fn provider<F>(mut self, identifier: impl Into<String>, factory: F) -> Self
    where
        F: ConnectionFactory + 'static,
    {
        self.providers.push((identifier.into(), Arc::new(factory)));
        self
    }

    /// Cipher used for `Encrypt: true` connection strings.
    pub fn cipher<C: Cipher + 'static>(mut self, cipher: C) -> Self {
        self.cipher = Some(Arc::new(cipher));
        self
    }

    pub fn keys(mut self, keys: KeyPair) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn build(self) -> DbResult<DbContext> {
        let mut registry = if self.builtin_providers {
            ProviderRegistry::with_builtin()?
        } else {
            ProviderRegistry::new()
        };
        for (identifier, factory) in self.providers {
            registry.register_arc(identifier, factory);
        }
        let providers = registry.into_shared();

        let mut config = ConfigRegistry::new(&self.options.config_path)
            .with_provider_check(providers.clone(), self.options.strict_providers);
        if let Some(dir) = &self.options.base_dir {
            config = config.with_base_dir(dir);
        }
        let config = Arc::new(config);

        debug!(
            config_path = %self.options.config_path.display(),
            providers = ?providers.read().identifiers(),
            "Database context created"
        );

        Ok(DbContext {
            provider_resolver: ProviderResolver::new(config.clone(), providers.clone()),
            connection_strings: ConnectionStringResolver::new(
                config.clone(),
                self.cipher.clone(),
                self.keys.clone(),
            ),
            options: self.options,
            config,
            providers,
            cipher: self.cipher,
            keys: self.keys,
        })
    }
}

/// Entry point for named database access.
pub struct DbContext {
    options: ContextOptions,
    config: Arc<ConfigRegistry>,
    providers: SharedProviders,
    provider_resolver: ProviderResolver,
    connection_strings: ConnectionStringResolver,
    cipher: Option<Arc<dyn Cipher>>,
    keys: Option<KeyPair>,
}

impl DbContext {
    pub fn builder() -> DbContextBuilder {
        DbContextBuilder::new()
    }

    /// Context with the built-in providers and no cipher.
    pub fn new(options: ContextOptions) -> DbResult<Self> {
        Self::builder().options(options).build()
    }

    pub fn options(&self) -> &ContextOptions {
        &self.options
    }

    pub fn config(&self) -> &ConfigRegistry {
        &self.config
    }

    /// Every configured database (loads the configuration on first use).
    pub fn databases(&self) -> DbResult<&[DatabaseEntry]> {
        self.config.load()
    }

    pub fn provider_resolver(&self) -> &ProviderResolver {
        &self.provider_resolver
    }

    pub fn connection_string_resolver(&self) -> &ConnectionStringResolver {
        &self.connection_strings
    }

    /// Register (or replace) a provider after startup.
    ///
    /// Names already resolved keep the handle they were resolved to.
    pub fn register_provider<F>(&self, identifier: &str, factory: F)
    where
        F: ConnectionFactory + 'static,
    {
        self.providers.write().register(identifier, factory);
    }

    pub fn provider_identifiers(&self) -> Vec<String> {
        self.providers.read().identifiers()
    }

    pub fn resolve_provider(&self, name: &str) -> DbResult<Arc<dyn ConnectionFactory>> {
        self.provider_resolver.resolve(name)
    }

    pub fn resolve_connection_string(&self, name: &str) -> DbResult<String> {
        self.connection_strings.resolve(name)
    }

    /// New session for the database called `name`, with the context's
    /// session defaults.
    pub fn session(&self, name: &str) -> DbResult<Session> {
        self.session_with(name, self.options.session_options())
    }

    pub fn session_with(&self, name: &str, options: SessionOptions) -> DbResult<Session> {
        let factory = self.provider_resolver.resolve(name)?;
        let connection_string = self.connection_strings.resolve(name)?;
        let entry = self.config.get(name)?;
        let session = Session::with_options(factory, connection_string, options).named(&entry.name);
        debug!(
            database = %entry.name,
            session_id = %session.id(),
            "Session created"
        );
        Ok(session)
    }

    /// Run one statement on a short-lived session.
    pub fn execute(&self, name: &str, command: impl Into<Command>) -> DbResult<u64> {
        self.session(name)?.execute(command)
    }

    pub fn query(&self, name: &str, command: impl Into<Command>) -> DbResult<Vec<Row>> {
        self.session(name)?.query(command)
    }

    pub fn execute_scalar(&self, name: &str, command: impl Into<Command>) -> DbResult<Option<DbValue>> {
        self.session(name)?.execute_scalar(command)
    }

    /// Run an atomic batch on a fresh session.
    pub fn run_batch(&self, name: &str, commands: &mut [BatchCommand]) -> DbResult<BatchSummary> {
        BatchExecutor::new(self).run_batch(name, commands)
    }

    /// Produce a value for an `Encrypt: true` connection string entry.
    pub fn encrypt_connection_string(&self, plain_text: &str) -> DbResult<String> {
        let cipher = self
            .cipher
            .as_ref()
            .ok_or_else(|| DbError::encryption_failure("no cipher configured"))?;
        let public_key = self
            .keys
            .as_ref()
            .map(|k| k.public_key.as_str())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| DbError::encryption_failure("no public key configured"))?;
        cipher
            .encrypt(plain_text, public_key)
            .map_err(|e| DbError::encryption_failure(e.to_string()))
    }
}

impl fmt::Debug for DbContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbContext")
            .field("options", &self.options)
            .field("config", &self.config)
            .field("provider_resolver", &self.provider_resolver)
            .field("connection_strings", &self.connection_strings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::provider::SQLITE_PROVIDER;
    use crate::models::{ConfigFileEntry, DatabaseType, generate_config_file, generate_detail_file};
    use crate::security::CipherError;
    use std::fs;
    use tempfile::tempdir;

    fn write_config(dir: &std::path::Path, entries: &[DatabaseEntry]) {
        fs::write(dir.join("detail.json"), generate_detail_file(entries).unwrap()).unwrap();
        fs::write(
            dir.join(DEFAULT_CONFIG_FILE),
            generate_config_file(&[ConfigFileEntry::new("detail.json", true)]).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_default_options() {
        let options = ContextOptions::default();
        assert_eq!(options.config_path, PathBuf::from("DbConfig.json"));
        assert_eq!(options.dispose_policy, DisposePolicy::Rollback);
        assert!(options.strict_providers);
        assert_eq!(options.command_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_session_by_name() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("main.db");
        write_config(
            dir.path(),
            &[DatabaseEntry::new(
                "Main",
                DatabaseType::SQLite,
                SQLITE_PROVIDER,
                format!("sqlite:{}", db_path.display()),
            )],
        );
        let ctx = DbContext::builder()
            .config_path(dir.path().join(DEFAULT_CONFIG_FILE))
            .build()
            .unwrap();

        let session = ctx.session("main").unwrap();
        assert_eq!(session.info().database.as_deref(), Some("Main"));
        assert_eq!(session.info().db_type, DatabaseType::SQLite);

        ctx.execute("main", "CREATE TABLE t (v INTEGER)").unwrap();
        ctx.execute("MAIN", Command::new("INSERT INTO t VALUES (?)").bind(5))
            .unwrap();
        assert_eq!(
            ctx.execute_scalar("main", "SELECT v FROM t").unwrap(),
            Some(DbValue::Int(5))
        );
    }

    #[test]
    fn test_unknown_database() {
        let dir = tempdir().unwrap();
        write_config(dir.path(), &[]);
        let ctx = DbContext::builder()
            .config_path(dir.path().join(DEFAULT_CONFIG_FILE))
            .without_builtin_providers()
            .build()
            .unwrap();
        assert!(matches!(
            ctx.session("ghost"),
            Err(DbError::DatabaseNotConfigured { .. })
        ));
    }

    #[test]
    fn test_encrypt_connection_string() {
        let reverse = |text: &str, _key: &str| -> Result<String, CipherError> {
            Ok(text.chars().rev().collect())
        };
        let ctx = DbContext::builder()
            .without_builtin_providers()
            .cipher(reverse)
            .keys(KeyPair::new("pub", "priv"))
            .build()
            .unwrap();
        // A bare function cipher only decrypts.
        assert!(matches!(
            ctx.encrypt_connection_string("sqlite:a.db"),
            Err(DbError::EncryptionFailure { .. })
        ));

        let plain = DbContext::builder()
            .without_builtin_providers()
            .build()
            .unwrap();
        assert!(plain.encrypt_connection_string("x").is_err());
    }
}
