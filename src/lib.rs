//! dbhelper library
//!
//! Named-database access for SQLite, PostgreSQL and MySQL: a two-level JSON
//! configuration maps logical names to a provider and a (possibly encrypted)
//! connection string; sessions manage one connection and its transaction;
//! batches apply a list of writes atomically.
//!
//! ```no_run
//! use dbhelper::{DbContext, models::BatchCommand};
//!
//! # fn main() -> dbhelper::error::DbResult<()> {
//! let ctx = DbContext::builder().config_path("DbConfig.json").build()?;
//! let mut batch = vec![
//!     BatchCommand::new("UPDATE stock SET qty = qty - 1 WHERE id = ?").bind(7).require_rows(),
//!     BatchCommand::new("INSERT INTO orders (item) VALUES (?)").bind(7),
//! ];
//! ctx.run_batch("Main", &mut batch)?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod models;
pub mod security;

pub use config::Config;
pub use context::{ContextOptions, DbContext, DbContextBuilder};
pub use db::{BatchExecutor, DisposePolicy, Session};
pub use error::{DbError, DbResult};
pub use security::{Cipher, CipherError, KeyPair};
