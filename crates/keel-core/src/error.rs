use thiserror::Error;

/// Core error type for keel operations.
#[derive(Error, Debug)]
pub enum KeelError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Ambiguous migration order key '{key}': '{first}' and '{second}'")]
    AmbiguousMigration {
        key: String,
        first: String,
        second: String,
    },

    #[error("Invalid migration: {0}")]
    InvalidMigration(String),

    #[error("Ledger initialization failed: {0}")]
    LedgerInit(String),

    #[error("Migration '{unit}' failed: {cause}")]
    MigrationExecution { unit: String, cause: String },

    #[error("Migration '{name}' is already recorded in the ledger")]
    DuplicateMigration { name: String },

    #[error("No down script on disk for applied migration '{name}'")]
    UnknownDownScript { name: String },

    #[error("Ledger update for migration '{unit}' failed: {cause}")]
    LedgerWrite { unit: String, cause: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias using KeelError.
pub type Result<T> = std::result::Result<T, KeelError>;

/// A migration run that stopped part-way.
///
/// `completed` holds the units that finished before `source` was raised. They
/// stay applied (or reverted); only the failing unit is left untouched.
#[derive(Error, Debug)]
#[error("{source} ({} migration(s) completed before the failure)", completed.len())]
pub struct RunError {
    pub completed: Vec<String>,
    #[source]
    pub source: KeelError,
}

impl RunError {
    pub fn new(completed: Vec<String>, source: KeelError) -> Self {
        Self { completed, source }
    }

    /// Number of units that succeeded in the same run before the failure.
    pub fn count(&self) -> usize {
        self.completed.len()
    }

    /// Name of the unit the failure is attributed to, when there is one.
    pub fn unit(&self) -> Option<&str> {
        match &self.source {
            KeelError::MigrationExecution { unit, .. } | KeelError::LedgerWrite { unit, .. } => {
                Some(unit)
            }
            KeelError::DuplicateMigration { name } | KeelError::UnknownDownScript { name } => {
                Some(name)
            }
            _ => None,
        }
    }
}

impl From<KeelError> for RunError {
    fn from(source: KeelError) -> Self {
        Self::new(Vec::new(), source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_error_reports_failing_unit() {
        let err = RunError::new(
            vec!["001_init".to_string()],
            KeelError::MigrationExecution {
                unit: "002_users".to_string(),
                cause: "syntax error".to_string(),
            },
        );

        assert_eq!(err.count(), 1);
        assert_eq!(err.unit(), Some("002_users"));
        let message = err.to_string();
        assert!(message.contains("002_users"));
        assert!(message.contains("1 migration(s) completed"));
    }

    #[test]
    fn test_run_error_from_setup_failure() {
        let err: RunError = KeelError::LedgerInit("permission denied".into()).into();
        assert_eq!(err.count(), 0);
        assert_eq!(err.unit(), None);
    }

    #[test]
    fn test_run_error_attributes_ledger_write() {
        let err = RunError::new(
            Vec::new(),
            KeelError::LedgerWrite {
                unit: "002_users".to_string(),
                cause: "no such table: migration".to_string(),
            },
        );
        assert_eq!(err.unit(), Some("002_users"));
        assert!(err.to_string().contains("002_users"));
    }
}
