pub mod db;
pub mod driver;
pub mod migrations;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use db::{Database, DatabasePool};
pub use driver::{Driver, DriverFuture, MySqlDriver, PostgresDriver, SqliteDriver};
pub use migrations::{
    Ledger, MigrationRunResult, MigrationStatus, RunState, Runner, ScriptStore,
};
