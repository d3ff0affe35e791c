//! In-memory driver for exercising the engine without a database.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use keel_core::error::KeelError;
use keel_core::migration::LedgerEntry;

use crate::driver::{Driver, DriverFuture};

/// In-memory [`Driver`].
///
/// Keeps the ledger as a vector with a monotonic id counter that follows the
/// same reseed rule as the SQL backends. Every executed script is logged, and
/// scripts containing a registered marker fail.
///
/// # Example
///
/// ```ignore
/// let driver = MemoryDriver::new();
/// driver.fail_on("BROKEN");
/// let runner = Runner::new(Arc::new(driver.clone()), &config);
/// ```
#[derive(Clone, Default)]
pub struct MemoryDriver {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    table: bool,
    rows: Vec<LedgerEntry>,
    next_id: i64,
    executed: Vec<String>,
    fail_markers: Vec<String>,
    fail_table_check: bool,
    fail_writes: bool,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every script containing `marker` fail in `execute`.
    pub fn fail_on(&self, marker: impl Into<String>) {
        self.state().fail_markers.push(marker.into());
    }

    /// Remove all failure markers.
    pub fn clear_failures(&self) {
        self.state().fail_markers.clear();
    }

    /// Make the ledger table existence check return an error.
    pub fn fail_table_check(&self) {
        self.state().fail_table_check = true;
    }

    /// Make `record_applied` and `record_reverted` return an error.
    pub fn fail_ledger_writes(&self) {
        self.state().fail_writes = true;
    }

    /// Scripts executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state().executed.clone()
    }

    /// Whether `create_table` has run.
    pub fn has_table(&self) -> bool {
        self.state().table
    }

    /// Current ledger rows ordered by id.
    pub fn rows(&self) -> Vec<LedgerEntry> {
        self.state().rows.clone()
    }

    /// Current ledger names ordered by id.
    pub fn names(&self) -> Vec<String> {
        self.state().rows.iter().map(|r| r.name.clone()).collect()
    }

    fn require_writable(state: &MemoryState) -> keel_core::Result<()> {
        Self::require_table(state)?;
        if state.fail_writes {
            return Err(KeelError::Database("disk I/O error".to_string()));
        }
        Ok(())
    }

    fn require_table(state: &MemoryState) -> keel_core::Result<()> {
        if state.table {
            Ok(())
        } else {
            Err(KeelError::Database(
                "relation \"migration\" does not exist".to_string(),
            ))
        }
    }
}

impl Driver for MemoryDriver {
    fn backend(&self) -> &'static str {
        "memory"
    }

    fn extension(&self) -> String {
        ".sql".to_string()
    }

    fn table_exists(&self) -> DriverFuture<'_, bool> {
        Box::pin(async move {
            let state = self.state();
            if state.fail_table_check {
                return Err(KeelError::Database("connection refused".to_string()));
            }
            Ok(state.table)
        })
    }

    fn create_table(&self) -> DriverFuture<'_, ()> {
        Box::pin(async move {
            let mut state = self.state();
            if !state.table {
                state.table = true;
                state.next_id = 1;
            }
            Ok(())
        })
    }

    fn status(&self) -> DriverFuture<'_, Option<String>> {
        Box::pin(async move {
            let state = self.state();
            Self::require_table(&state)?;
            Ok(state
                .rows
                .iter()
                .max_by_key(|r| r.id)
                .map(|r| r.name.clone()))
        })
    }

    fn entries(&self) -> DriverFuture<'_, Vec<LedgerEntry>> {
        Box::pin(async move {
            let state = self.state();
            Self::require_table(&state)?;
            let mut rows = state.rows.clone();
            rows.sort_by_key(|r| r.id);
            Ok(rows)
        })
    }

    fn execute<'a>(&'a self, script: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state();
            if let Some(marker) = state.fail_markers.iter().find(|m| script.contains(m.as_str())) {
                return Err(KeelError::Database(format!(
                    "injected failure on '{}'",
                    marker
                )));
            }
            state.executed.push(script.to_string());
            Ok(())
        })
    }

    fn record_applied<'a>(&'a self, name: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state();
            Self::require_writable(&state)?;
            if state.rows.iter().any(|r| r.name == name) {
                return Err(KeelError::DuplicateMigration {
                    name: name.to_string(),
                });
            }

            let id = state.next_id;
            state.next_id += 1;
            state.rows.push(LedgerEntry {
                id,
                name: name.to_string(),
                applied_at: Utc::now(),
            });
            Ok(())
        })
    }

    fn record_reverted<'a>(&'a self, name: &'a str) -> DriverFuture<'a, ()> {
        Box::pin(async move {
            let mut state = self.state();
            Self::require_writable(&state)?;

            let before = state.rows.len();
            state.rows.retain(|r| r.name != name);
            if state.rows.len() == before {
                return Err(KeelError::NotFound(format!(
                    "Migration '{}' is not recorded in the ledger",
                    name
                )));
            }

            state.next_id = state.rows.iter().map(|r| r.id).max().map_or(1, |id| id + 1);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reseed_after_reverting_latest() {
        let driver = MemoryDriver::new();
        driver.create_table().await.unwrap();

        driver.record_applied("001_a").await.unwrap();
        driver.record_applied("002_b").await.unwrap();
        driver.record_reverted("002_b").await.unwrap();
        driver.record_applied("003_c").await.unwrap();

        let rows = driver.rows();
        assert_eq!(rows[0].id, 1);
        assert_eq!(rows[1].id, 2);
        assert!(rows[1].id > rows[0].id);
        assert_eq!(driver.status().await.unwrap().as_deref(), Some("003_c"));
    }

    #[tokio::test]
    async fn test_empty_ledger_restarts_at_one() {
        let driver = MemoryDriver::new();
        driver.create_table().await.unwrap();

        driver.record_applied("001_a").await.unwrap();
        driver.record_reverted("001_a").await.unwrap();
        driver.record_applied("001_a").await.unwrap();

        assert_eq!(driver.rows()[0].id, 1);
    }

    #[tokio::test]
    async fn test_duplicate_and_missing_table() {
        let driver = MemoryDriver::new();
        assert!(driver.status().await.is_err());

        driver.create_table().await.unwrap();
        driver.record_applied("001_a").await.unwrap();
        assert!(matches!(
            driver.record_applied("001_a").await,
            Err(KeelError::DuplicateMigration { .. })
        ));
    }

    #[tokio::test]
    async fn test_failure_marker() {
        let driver = MemoryDriver::new();
        driver.fail_on("BROKEN");

        assert!(driver.execute("SELECT BROKEN").await.is_err());
        driver.execute("SELECT 1").await.unwrap();
        assert_eq!(driver.executed(), vec!["SELECT 1".to_string()]);

        driver.clear_failures();
        driver.execute("SELECT BROKEN").await.unwrap();
        assert_eq!(driver.executed().len(), 2);
    }
}
