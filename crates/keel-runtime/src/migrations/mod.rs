//! Migration discovery, ledger reads and the apply/revert runner.

mod ledger;
mod runner;
mod sql;
mod store;

pub use ledger::Ledger;
pub use runner::{AppliedMigration, MigrationRunResult, MigrationStatus, RunState, Runner};
pub use sql::{split_sql_statements, Dialect};
pub use store::ScriptStore;
