//! The storage capability set a database backend implements.
//!
//! The engine never runs SQL on its own; everything goes through a [`Driver`].
//! A driver owns the physical ledger table, executes script bodies and keeps
//! the ledger's surrogate key monotonic after deletions.

mod mysql;
mod postgres;
mod sqlite;

pub use mysql::MySqlDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

use std::future::Future;
use std::pin::Pin;

use keel_core::error::{KeelError, Result};
use keel_core::migration::LedgerEntry;

/// Boxed future returned by driver operations.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Storage capability set for one database backend.
pub trait Driver: Send + Sync {
    /// Backend name used in logs.
    fn backend(&self) -> &'static str;

    /// Script file suffix including the leading dot (e.g. ".sql").
    fn extension(&self) -> String;

    /// Whether the ledger table exists. A missing table is `Ok(false)`.
    fn table_exists(&self) -> DriverFuture<'_, bool>;

    /// Create the ledger table. Callers check [`Driver::table_exists`] first.
    fn create_table(&self) -> DriverFuture<'_, ()>;

    /// Name of the ledger row with the highest id, `None` when empty.
    fn status(&self) -> DriverFuture<'_, Option<String>>;

    /// All ledger rows ordered by id ascending.
    fn entries(&self) -> DriverFuture<'_, Vec<LedgerEntry>>;

    /// Run a migration script body as one unit.
    fn execute<'a>(&'a self, script: &'a str) -> DriverFuture<'a, ()>;

    /// Insert a ledger row. Fails with `DuplicateMigration` if `name` exists.
    fn record_applied<'a>(&'a self, name: &'a str) -> DriverFuture<'a, ()>;

    /// Delete the ledger row for `name` and reseed the id counter to
    /// `max(id) + 1`, or 1 when the ledger is now empty.
    fn record_reverted<'a>(&'a self, name: &'a str) -> DriverFuture<'a, ()>;
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Map an insert failure, turning unique-constraint violations into
/// `DuplicateMigration`.
pub(crate) fn record_error(name: &str, err: sqlx::Error) -> KeelError {
    if is_unique_violation(&err) {
        KeelError::DuplicateMigration {
            name: name.to_string(),
        }
    } else {
        KeelError::Database(format!("Failed to record migration '{}': {}", name, err))
    }
}

pub(crate) fn not_recorded(name: &str) -> KeelError {
    KeelError::NotFound(format!("Migration '{}' is not recorded in the ledger", name))
}

pub(crate) fn ledger_error(action: &str, err: sqlx::Error) -> KeelError {
    KeelError::Database(format!("Failed to {}: {}", action, err))
}
