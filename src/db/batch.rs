//! Atomic write batches.
//!
//! A batch runs on one session inside one transaction. Either every command
//! is committed or none is: the first failing command, or the first command
//! marked `require_nonzero_rows` that changes nothing, rolls the whole batch
//! back.

use crate::context::DbContext;
use crate::db::session::Session;
use crate::error::{DbError, DbResult};
use crate::models::BatchCommand;
use serde::Serialize;
use std::time::Instant;
use tracing::{info, warn};

/// Result of running a single batch command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The command ran and its row count is acceptable.
    Applied(u64),
    /// The command requires rows but changed none.
    ZeroRows,
}

/// Summary of a committed batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub session_id: String,
    /// Affected rows per command, in batch order.
    pub affected: Vec<u64>,
    pub total_affected: u64,
    pub elapsed_ms: u64,
}

impl BatchSummary {
    pub fn statements(&self) -> usize {
        self.affected.len()
    }
}

/// Runs batches against databases of a [`DbContext`].
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutor<'a> {
    context: &'a DbContext,
}

impl<'a> BatchExecutor<'a> {
    pub fn new(context: &'a DbContext) -> Self {
        Self { context }
    }

    /// Run `commands` against the database called `name` on a fresh session.
    pub fn run_batch(&self, name: &str, commands: &mut [BatchCommand]) -> DbResult<BatchSummary> {
        let mut session = self.context.session(name)?;
        let result = Self::run_in(&mut session, commands);
        if let Err(e) = session.close() {
            warn!(database = %name, error = %e, "Failed to close batch session");
        }
        result
    }

    /// Run `commands` on an existing session that has no active transaction.
    ///
    /// Each command's `affected_rows` is filled in as it runs.
    pub fn run_in(session: &mut Session, commands: &mut [BatchCommand]) -> DbResult<BatchSummary> {
        let start = Instant::now();
        let session_id = session.id().to_string();
        if commands.is_empty() {
            info!(session_id = %session_id, "Empty batch, nothing to run");
            return Ok(BatchSummary {
                session_id,
                affected: Vec::new(),
                total_affected: 0,
                elapsed_ms: 0,
            });
        }

        info!(session_id = %session_id, statements = commands.len(), "Running batch");
        session.begin_transaction()?;

        let mut affected = Vec::with_capacity(commands.len());
        for (index, command) in commands.iter_mut().enumerate() {
            // A failed statement has already rolled the transaction back.
            let outcome = execute_step(session, command)?;
            affected.push(command.affected_rows.unwrap_or_default());

            if outcome == StepOutcome::ZeroRows {
                warn!(
                    session_id = %session_id,
                    index,
                    sql = %command.sql(),
                    "Command affected no rows, rolling back batch"
                );
                if let Err(e) = session.rollback_transaction() {
                    warn!(session_id = %session_id, error = %e, "Rollback of batch failed");
                }
                return Err(DbError::ZeroRowRollback {
                    index,
                    sql: command.sql().to_string(),
                    affected,
                });
            }
        }

        session.commit_transaction()?;

        let total_affected = affected.iter().sum();
        let elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            session_id = %session_id,
            statements = affected.len(),
            rows_affected = total_affected,
            elapsed_ms,
            "Batch committed"
        );
        Ok(BatchSummary {
            session_id,
            affected,
            total_affected,
            elapsed_ms,
        })
    }
}

/// Execute one command and classify its row count.
pub fn execute_step(session: &mut Session, command: &mut BatchCommand) -> DbResult<StepOutcome> {
    let rows = session.execute(command.command.clone())?;
    command.affected_rows = Some(rows);
    if command.require_nonzero_rows && rows == 0 {
        Ok(StepOutcome::ZeroRows)
    } else {
        Ok(StepOutcome::Applied(rows))
    }
}
