//! Session: one physical connection plus an optional transaction.
//!
//! The connection is opened lazily. Outside a transaction every call leaves
//! the connection the way it found it: a connection opened for the call is
//! closed again on every exit path. Inside a transaction the connection
//! stays open until the transaction ends.

use crate::db::provider::{ConnectionFactory, DbConnection};
use crate::error::{DbError, DbResult};
use crate::models::{
    Command, DEFAULT_COMMAND_TIMEOUT_SECS, DatabaseType, DbValue, ResultSet, Row,
    mask_connection_string,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What happens to a transaction still open when the session is closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DisposePolicy {
    /// Discard the pending work.
    #[default]
    Rollback,
    /// Commit the pending work.
    Commit,
}

/// Per-session settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Timeout for commands that do not set their own.
    pub command_timeout: Duration,
    pub dispose_policy: DisposePolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            dispose_policy: DisposePolicy::default(),
        }
    }
}

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No physical connection.
    Idle,
    Open,
    InTransaction,
    /// Terminal; every further operation fails.
    Closed,
}

/// Descriptive metadata, safe to log.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: String,
    /// Configured name, when the session was created by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    pub db_type: DatabaseType,
    pub created_at: DateTime<Utc>,
}

/// Generate a unique session ID.
fn generate_session_id() -> String {
    format!("ses_{}", uuid::Uuid::new_v4().simple())
}

/// A logical unit of work against one database.
pub struct Session {
    info: SessionInfo,
    /// Contains sensitive data - never log
    connection_string: String,
    factory: Arc<dyn ConnectionFactory>,
    options: SessionOptions,
    conn: Option<Box<dyn DbConnection>>,
    in_transaction: bool,
    /// The active transaction opened the connection and closes it when it ends.
    owns_connection: bool,
    closed: bool,
}

impl Session {
    /// Session for an explicit provider and connection string.
    pub fn new(factory: Arc<dyn ConnectionFactory>, connection_string: impl Into<String>) -> Self {
        Self::with_options(factory, connection_string, SessionOptions::default())
    }

    pub fn with_options(
        factory: Arc<dyn ConnectionFactory>,
        connection_string: impl Into<String>,
        options: SessionOptions,
    ) -> Self {
        let info = SessionInfo {
            id: generate_session_id(),
            database: None,
            db_type: factory.database_type(),
            created_at: Utc::now(),
        };
        Self {
            info,
            connection_string: connection_string.into(),
            factory,
            options,
            conn: None,
            in_transaction: false,
            owns_connection: false,
            closed: false,
        }
    }

    /// Record the configured name this session was created for.
    pub(crate) fn named(mut self, database: impl Into<String>) -> Self {
        self.info.database = Some(database.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> SessionState {
        if self.closed {
            SessionState::Closed
        } else if self.in_transaction {
            SessionState::InTransaction
        } else if self.conn.is_some() {
            SessionState::Open
        } else {
            SessionState::Idle
        }
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Open the physical connection if it is not open yet.
    ///
    /// An explicitly opened connection stays open across calls until
    /// [`close_connection`](Self::close_connection) or [`close`](Self::close).
    pub fn open(&mut self) -> DbResult<()> {
        self.ensure_usable()?;
        if self.conn.is_none() {
            self.connect()?;
        }
        Ok(())
    }

    /// Close the physical connection; the session stays usable.
    pub fn close_connection(&mut self) -> DbResult<()> {
        self.ensure_usable()?;
        if self.in_transaction {
            return Err(DbError::invalid_state(
                "cannot close the connection while a transaction is active",
            ));
        }
        self.release()
    }

    pub fn begin_transaction(&mut self) -> DbResult<()> {
        self.ensure_usable()?;
        if self.in_transaction {
            return Err(DbError::invalid_state("a transaction is already active"));
        }

        let opened = self.conn.is_none();
        if opened {
            self.connect()
                .map_err(|e| DbError::begin_failure(e.to_string()))?;
        }

        let result = match self.conn.as_deref_mut() {
            Some(conn) => conn.begin(),
            None => Err(DbError::invalid_state("connection is not open")),
        };
        if let Err(e) = result {
            self.in_transaction = false;
            if opened {
                self.release_logged();
            }
            warn!(session_id = %self.info.id, error = %e, "Transaction begin failed");
            return Err(DbError::begin_failure(e.to_string()));
        }

        self.in_transaction = true;
        self.owns_connection = opened;
        info!(session_id = %self.info.id, "Transaction started");
        Ok(())
    }

    /// Commit the active transaction, if any.
    ///
    /// A failed commit is followed by a rollback attempt and reported as
    /// [`DbError::CommitFailure`] whatever the rollback outcome.
    pub fn commit_transaction(&mut self) -> DbResult<()> {
        self.ensure_usable()?;
        self.settle(DisposePolicy::Commit)
    }

    /// Roll back the active transaction, if any.
    pub fn rollback_transaction(&mut self) -> DbResult<()> {
        self.ensure_usable()?;
        self.settle(DisposePolicy::Rollback)
    }

    /// Run a statement and return the affected-row count.
    pub fn execute(&mut self, command: impl Into<Command>) -> DbResult<u64> {
        let command = command.into();
        let timeout = command.effective_timeout(self.options.command_timeout);
        debug!(
            session_id = %self.info.id,
            sql = %command.sql,
            params = command.params.len(),
            "Executing statement"
        );
        let rows_affected = self.run(|conn| conn.execute(&command, timeout))?;
        debug!(session_id = %self.info.id, rows_affected, "Statement executed");
        Ok(rows_affected)
    }

    /// First column of the first row, `None` when there are no rows.
    pub fn execute_scalar(&mut self, command: impl Into<Command>) -> DbResult<Option<DbValue>> {
        let set = self.execute_reader(command)?;
        Ok(set.scalar().cloned())
    }

    /// Run a statement and return its full result set.
    pub fn execute_reader(&mut self, command: impl Into<Command>) -> DbResult<ResultSet> {
        let command = command.into();
        let timeout = command.effective_timeout(self.options.command_timeout);
        debug!(
            session_id = %self.info.id,
            sql = %command.sql,
            params = command.params.len(),
            "Executing query"
        );
        let set = self.run(|conn| conn.query(&command, timeout))?;
        debug!(session_id = %self.info.id, rows = set.row_count(), "Query returned");
        Ok(set)
    }

    pub fn query(&mut self, command: impl Into<Command>) -> DbResult<Vec<Row>> {
        Ok(self.execute_reader(command)?.rows)
    }

    /// Every row mapped onto `T`.
    pub fn query_as<T: DeserializeOwned>(&mut self, command: impl Into<Command>) -> DbResult<Vec<T>> {
        self.query(command)?.iter().map(Row::to_record).collect()
    }

    /// First row, loosely typed.
    pub fn query_row(&mut self, command: impl Into<Command>) -> DbResult<Option<Row>> {
        Ok(self.query(command)?.into_iter().next())
    }

    /// First row mapped onto `T`; no rows is an error.
    pub fn query_first<T: DeserializeOwned>(&mut self, command: impl Into<Command>) -> DbResult<T> {
        match self.query_row(command)? {
            Some(row) => row.to_record(),
            None => Err(DbError::unexpected_row_count("at least one", 0)),
        }
    }

    /// First row mapped onto `T`, or `T::default()` when there are no rows.
    pub fn query_first_or_default<T>(&mut self, command: impl Into<Command>) -> DbResult<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.query_row(command)? {
            Some(row) => row.to_record(),
            None => Ok(T::default()),
        }
    }

    /// The only row mapped onto `T`; anything but exactly one row is an error.
    pub fn query_single<T: DeserializeOwned>(&mut self, command: impl Into<Command>) -> DbResult<T> {
        let rows = self.query(command)?;
        match rows.as_slice() {
            [row] => row.to_record(),
            other => Err(DbError::unexpected_row_count("exactly one", other.len())),
        }
    }

    /// Like [`query_single`](Self::query_single), but no rows gives `T::default()`.
    pub fn query_single_or_default<T>(&mut self, command: impl Into<Command>) -> DbResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let rows = self.query(command)?;
        match rows.as_slice() {
            [] => Ok(T::default()),
            [row] => row.to_record(),
            other => Err(DbError::unexpected_row_count("at most one", other.len())),
        }
    }

    /// Settle any pending transaction per the dispose policy and release the
    /// connection. Idempotent; the session is unusable afterwards.
    pub fn close(&mut self) -> DbResult<()> {
        if self.closed {
            return Ok(());
        }
        let settled = if self.in_transaction {
            info!(
                session_id = %self.info.id,
                policy = ?self.options.dispose_policy,
                "Settling pending transaction on close"
            );
            self.settle(self.options.dispose_policy)
        } else {
            Ok(())
        };
        let released = self.release();
        self.closed = true;
        debug!(session_id = %self.info.id, "Session closed");
        settled.and(released)
    }

    fn ensure_usable(&self) -> DbResult<()> {
        if self.closed {
            return Err(DbError::invalid_state(format!(
                "session {} is closed",
                self.info.id
            )));
        }
        Ok(())
    }

    fn connect(&mut self) -> DbResult<()> {
        let conn = self.factory.connect(&self.connection_string)?;
        self.conn = Some(conn);
        debug!(
            session_id = %self.info.id,
            database = ?self.info.database,
            "Connection opened"
        );
        Ok(())
    }

    fn release(&mut self) -> DbResult<()> {
        match self.conn.take() {
            Some(conn) => {
                debug!(session_id = %self.info.id, "Connection closed");
                conn.close()
            }
            None => Ok(()),
        }
    }

    fn release_logged(&mut self) {
        if let Err(e) = self.release() {
            warn!(session_id = %self.info.id, error = %e, "Failed to close connection");
        }
    }

    /// End the active transaction with a commit or a rollback.
    ///
    /// The flag is cleared and a connection owned by the transaction is
    /// released on every path.
    fn settle(&mut self, action: DisposePolicy) -> DbResult<()> {
        if !self.in_transaction {
            debug!(session_id = %self.info.id, "No active transaction");
            return Ok(());
        }

        let result = match self.conn.as_deref_mut() {
            None => Err(DbError::invalid_state("transaction has no open connection")),
            Some(conn) => match action {
                DisposePolicy::Commit => conn.commit().map_err(|e| {
                    let rollback_error = conn.rollback().err().map(|r| r.to_string());
                    DbError::commit_failure(e.to_string(), rollback_error)
                }),
                DisposePolicy::Rollback => conn.rollback(),
            },
        };

        self.in_transaction = false;
        if std::mem::take(&mut self.owns_connection) {
            self.release_logged();
        }

        match &result {
            Ok(()) => info!(session_id = %self.info.id, action = ?action, "Transaction ended"),
            Err(e) => warn!(session_id = %self.info.id, action = ?action, error = %e, "Transaction end failed"),
        }
        result
    }

    /// Run `op` on the connection under the session's transaction rules.
    fn run<T>(&mut self, op: impl FnOnce(&mut dyn DbConnection) -> DbResult<T>) -> DbResult<T> {
        self.ensure_usable()?;

        if self.in_transaction {
            let result = match self.conn.as_deref_mut() {
                Some(conn) => op(conn),
                None => Err(DbError::invalid_state("transaction has no open connection")),
            };
            if let Err(e) = &result {
                warn!(session_id = %self.info.id, error = %e, "Statement failed, rolling back");
                if let Err(rb) = self.settle(DisposePolicy::Rollback) {
                    warn!(session_id = %self.info.id, error = %rb, "Rollback after failure failed");
                }
            }
            return result;
        }

        let was_open = self.conn.is_some();
        if !was_open {
            self.connect()?;
        }
        let guard = AutoClose {
            session: self,
            close: !was_open,
        };
        let result = match guard.session.conn.as_deref_mut() {
            Some(conn) => op(conn),
            None => Err(DbError::invalid_state("connection is not open")),
        };
        result
    }
}

/// Closes a connection opened for a single call when the call ends.
struct AutoClose<'a> {
    session: &'a mut Session,
    close: bool,
}

impl Drop for AutoClose<'_> {
    fn drop(&mut self) {
        if self.close {
            self.session.release_logged();
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(session_id = %self.info.id, error = %e, "Error while closing session");
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("info", &self.info)
            .field(
                "connection_string",
                &mask_connection_string(&self.connection_string),
            )
            .field("state", &self.state())
            .finish()
    }
}
