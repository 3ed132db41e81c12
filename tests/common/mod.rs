//! Shared helpers for integration tests.
//!
//! Provides temporary two-level configurations and a scripted in-memory
//! driver whose connections record every call, keep writes staged until
//! commit, and can be told to fail at chosen points.

#![allow(dead_code)]

use dbhelper::db::{ConnectionFactory, DbConnection, SQLITE_PROVIDER};
use dbhelper::error::{DbError, DbResult};
use dbhelper::models::{
    Command, ConfigFileEntry, DatabaseEntry, DatabaseType, ResultSet, Row, generate_config_file,
    generate_detail_file,
};
use dbhelper::DbContext;
use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Provider identifier the scripted driver is registered under.
pub const SCRIPTED_PROVIDER: &str = "scripted";

// =========================================================================
// Configuration files
// =========================================================================

/// A config-file list plus detail files in a temporary directory.
pub struct TestConfig {
    pub dir: TempDir,
}

impl TestConfig {
    /// One active detail file (`DbDetail.json`) holding `entries`.
    pub fn new(entries: &[DatabaseEntry]) -> Self {
        let config = Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
        };
        config.write_detail("DbDetail.json", entries);
        config.write_list(&[ConfigFileEntry::new("DbDetail.json", true)]);
        config
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("DbConfig.json")
    }

    pub fn write_list(&self, files: &[ConfigFileEntry]) {
        std::fs::write(
            self.config_path(),
            generate_config_file(files).expect("Failed to render config list"),
        )
        .expect("Failed to write config list");
    }

    pub fn write_detail(&self, file_name: &str, entries: &[DatabaseEntry]) {
        std::fs::write(
            self.dir.path().join(file_name),
            generate_detail_file(entries).expect("Failed to render detail file"),
        )
        .expect("Failed to write detail file");
    }

    /// URL of a SQLite file inside the temporary directory.
    pub fn sqlite_url(&self, file_name: &str) -> String {
        format!("sqlite:{}", self.dir.path().join(file_name).display())
    }

    /// Context over this configuration with the built-in providers.
    pub fn context(&self) -> DbContext {
        DbContext::builder()
            .config_path(self.config_path())
            .build()
            .expect("Failed to build context")
    }

    /// Context with the built-in providers plus `driver` as `scripted`.
    pub fn scripted_context(&self, driver: &ScriptedDriver) -> DbContext {
        DbContext::builder()
            .config_path(self.config_path())
            .provider(SCRIPTED_PROVIDER, driver.clone())
            .build()
            .expect("Failed to build context")
    }
}

pub fn sqlite_entry(name: &str, url: &str) -> DatabaseEntry {
    DatabaseEntry::new(name, DatabaseType::SQLite, SQLITE_PROVIDER, url)
}

pub fn scripted_entry(name: &str) -> DatabaseEntry {
    DatabaseEntry::new(name, DatabaseType::Other, SCRIPTED_PROVIDER, "scripted://memory")
}

/// Create a `stock` table on a SQLite file with two rows.
pub fn seed_stock(ctx: &DbContext, name: &str) {
    ctx.execute(
        name,
        "CREATE TABLE stock (id INTEGER PRIMARY KEY, item TEXT NOT NULL, qty INTEGER NOT NULL)",
    )
    .expect("Failed to create table");
    ctx.execute(
        name,
        "INSERT INTO stock (id, item, qty) VALUES (1, 'bolt', 10), (2, 'nut', 0)",
    )
    .expect("Failed to seed table");
}

pub fn qty(ctx: &DbContext, name: &str, id: i64) -> Option<i64> {
    ctx.execute_scalar(name, Command::new("SELECT qty FROM stock WHERE id = ?").bind(id))
        .expect("Failed to read qty")
        .and_then(|v| v.as_i64())
}

// =========================================================================
// Scripted driver
// =========================================================================

/// Shared state of every connection opened by one [`ScriptedDriver`].
#[derive(Debug, Default)]
pub struct ScriptState {
    /// Every driver call, in order.
    pub log: Vec<String>,
    pub connects: usize,
    pub open_connections: usize,
    /// Statements made durable (autocommit or committed).
    pub committed: Vec<String>,
    /// Affected-row count per statement text; anything else affects 1 row.
    pub row_counts: HashMap<String, u64>,
    /// Rows returned by every query.
    pub rows: Vec<Row>,
    pub fail_connect: bool,
    pub fail_begin: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    /// Executing this exact statement fails.
    pub fail_sql: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedDriver {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock()
    }

    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    pub fn committed(&self) -> Vec<String> {
        self.state().committed.clone()
    }

    pub fn open_connections(&self) -> usize {
        self.state().open_connections
    }

    pub fn set_rows_affected(&self, sql: &str, rows: u64) {
        self.state().row_counts.insert(sql.to_string(), rows);
    }
}

impl ConnectionFactory for ScriptedDriver {
    fn database_type(&self) -> DatabaseType {
        DatabaseType::Other
    }

    fn connect(&self, _connection_string: &str) -> DbResult<Box<dyn DbConnection>> {
        let mut state = self.state();
        state.log.push("connect".to_string());
        if state.fail_connect {
            return Err(DbError::connection("scripted connect failure", "none"));
        }
        state.connects += 1;
        state.open_connections += 1;
        Ok(Box::new(ScriptedConnection {
            state: Arc::clone(&self.state),
            staged: None,
        }))
    }
}

struct ScriptedConnection {
    state: Arc<Mutex<ScriptState>>,
    /// Writes of the open transaction, if one is open.
    staged: Option<Vec<String>>,
}

impl DbConnection for ScriptedConnection {
    fn begin(&mut self) -> DbResult<()> {
        let mut state = self.state.lock();
        state.log.push("begin".to_string());
        if state.fail_begin {
            return Err(DbError::execution("scripted begin failure", None));
        }
        self.staged = Some(Vec::new());
        Ok(())
    }

    fn commit(&mut self) -> DbResult<()> {
        let mut state = self.state.lock();
        state.log.push("commit".to_string());
        if state.fail_commit {
            return Err(DbError::execution("scripted commit failure", None));
        }
        let staged = self.staged.take().unwrap_or_default();
        state.committed.extend(staged);
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        let mut state = self.state.lock();
        state.log.push("rollback".to_string());
        self.staged = None;
        if state.fail_rollback {
            return Err(DbError::execution("scripted rollback failure", None));
        }
        Ok(())
    }

    fn execute(&mut self, command: &Command, _timeout: Duration) -> DbResult<u64> {
        let mut state = self.state.lock();
        state.log.push(command.sql.clone());
        if state.fail_sql.as_deref() == Some(command.sql.as_str()) {
            return Err(DbError::execution("scripted statement failure", None));
        }
        let rows = state.row_counts.get(&command.sql).copied().unwrap_or(1);
        match self.staged.as_mut() {
            Some(staged) => staged.push(command.sql.clone()),
            None => state.committed.push(command.sql.clone()),
        }
        Ok(rows)
    }

    fn query(&mut self, command: &Command, _timeout: Duration) -> DbResult<ResultSet> {
        let mut state = self.state.lock();
        state.log.push(command.sql.clone());
        Ok(ResultSet::from_rows(state.rows.clone()))
    }

    fn close(self: Box<Self>) -> DbResult<()> {
        let mut state = self.state.lock();
        state.log.push("close".to_string());
        state.open_connections -= 1;
        Ok(())
    }
}
