//! Driver dispatch macro.
//!
//! Generates the per-engine match over an open sqlx connection so each
//! operation is written once per engine and read top to bottom.

/// Macro for generating connection dispatch match arms.
///
/// This macro generates match arms for `DbConn` variants, reducing the need
/// to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(&mut self.conn, {
///     MySql(c) => run_mysql(c),
///     Postgres(c) => run_postgres(c),
///     SQLite(c) => run_sqlite(c),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::driver::DbConn::$variant($c) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
