//! Shared types for keel: configuration, the error taxonomy and the
//! migration data model.

pub mod config;
pub mod error;
pub mod migration;

pub use config::{Backend, DatabaseConfig, KeelConfig, MigrationsConfig};
pub use error::{KeelError, Result, RunError};
pub use migration::{Direction, LedgerEntry, MigrationUnit};
