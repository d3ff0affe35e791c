//! Migration runner.
//!
//! Applies pending units oldest-first and reverts applied units newest-first.
//! Each unit's script-then-record pair is the unit of atomicity: a run that
//! fails part-way keeps the units it already finished and leaves the failing
//! unit untouched in the ledger.
//!
//! The runner assumes it is the only writer for its ledger. A second writer
//! racing on the same unit trips the ledger's unique constraint and fails with
//! `DuplicateMigration`.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use keel_core::config::MigrationsConfig;
use keel_core::error::{KeelError, Result, RunError};
use keel_core::migration::{Direction, LedgerEntry, MigrationUnit};

use super::ledger::Ledger;
use super::store::ScriptStore;
use crate::driver::Driver;

/// Where the runner is within the current invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    EnsuringLedger,
    Diffing,
    /// Working on the i-th unit of the current work list.
    Applying(usize),
    Failed,
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct MigrationRunResult {
    pub direction: Direction,
    /// Units applied or reverted, in execution order.
    pub completed: Vec<String>,
    pub elapsed: Duration,
}

impl MigrationRunResult {
    pub fn count(&self) -> usize {
        self.completed.len()
    }
}

/// An applied ledger entry and whether its unit is still on disk.
#[derive(Debug, Clone, Serialize)]
pub struct AppliedMigration {
    #[serde(flatten)]
    pub entry: LedgerEntry,
    pub on_disk: bool,
    pub has_down: bool,
}

/// Applied and pending migrations.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    pub current: Option<String>,
    pub applied: Vec<AppliedMigration>,
    pub pending: Vec<String>,
}

/// Drives a single ledger through a [`Driver`].
pub struct Runner {
    driver: Arc<dyn Driver>,
    store: ScriptStore,
    ledger: Ledger,
    state: Mutex<RunState>,
}

impl Runner {
    /// Create a runner for the configured folder, using the driver's extension.
    pub fn new(driver: Arc<dyn Driver>, config: &MigrationsConfig) -> Self {
        let store = ScriptStore::new(config.folder.clone(), driver.extension());
        Self::with_store(driver, store)
    }

    pub fn with_store(driver: Arc<dyn Driver>, store: ScriptStore) -> Self {
        Self {
            ledger: Ledger::new(driver.clone()),
            driver,
            store,
            state: Mutex::new(RunState::Idle),
        }
    }

    pub fn store(&self) -> &ScriptStore {
        &self.store
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn fail(&self, completed: Vec<String>, error: KeelError) -> RunError {
        self.transition(RunState::Failed);
        RunError::new(completed, error)
    }

    /// Create the ledger table if it does not exist.
    pub async fn ensure_ledger(&self) -> Result<()> {
        let exists = self
            .driver
            .table_exists()
            .await
            .map_err(|e| KeelError::LedgerInit(e.to_string()))?;

        if !exists {
            info!("Creating ledger table ({})", self.driver.backend());
            self.driver
                .create_table()
                .await
                .map_err(|e| KeelError::LedgerInit(e.to_string()))?;
        }
        Ok(())
    }

    /// Apply every pending migration, oldest first.
    pub async fn up_all(&self) -> std::result::Result<MigrationRunResult, RunError> {
        self.run_up(usize::MAX).await
    }

    /// Apply only the oldest pending migration.
    pub async fn up_one(&self) -> std::result::Result<MigrationRunResult, RunError> {
        self.run_up(1).await
    }

    async fn run_up(&self, limit: usize) -> std::result::Result<MigrationRunResult, RunError> {
        let start = Instant::now();

        self.transition(RunState::EnsuringLedger);
        if let Err(e) = self.ensure_ledger().await {
            return Err(self.fail(Vec::new(), e));
        }

        self.transition(RunState::Diffing);
        let pending = match self.pending().await {
            Ok(pending) => pending,
            Err(e) => return Err(self.fail(Vec::new(), e)),
        };
        debug!("{} pending migration(s)", pending.len());

        let mut completed = Vec::new();
        for (i, unit) in pending.iter().take(limit).enumerate() {
            self.transition(RunState::Applying(i));
            if let Err(e) = self.apply(unit).await {
                warn!(
                    "Migration {} failed after {} applied: {}",
                    unit.name,
                    completed.len(),
                    e
                );
                return Err(self.fail(completed, e));
            }
            completed.push(unit.name.clone());
        }

        self.transition(RunState::Idle);
        info!("Applied {} migration(s)", completed.len());
        Ok(MigrationRunResult {
            direction: Direction::Up,
            completed,
            elapsed: start.elapsed(),
        })
    }

    /// Revert the most recently applied migration.
    ///
    /// Returns the reverted name, or `None` when the ledger is empty. A failing
    /// down script leaves the ledger entry in place.
    pub async fn step_down(&self) -> Result<Option<String>> {
        self.transition(RunState::EnsuringLedger);
        if let Err(e) = self.ensure_ledger().await {
            self.transition(RunState::Failed);
            return Err(e);
        }

        self.transition(RunState::Diffing);
        let result = self.revert_latest().await;
        self.transition(match result {
            Ok(_) => RunState::Idle,
            Err(_) => RunState::Failed,
        });
        result
    }

    async fn revert_latest(&self) -> Result<Option<String>> {
        let Some(name) = self.ledger.latest().await? else {
            debug!("Ledger is empty, nothing to revert");
            return Ok(None);
        };

        let unit = self
            .store
            .find(&name)?
            .ok_or_else(|| KeelError::UnknownDownScript { name: name.clone() })?;

        self.transition(RunState::Applying(0));
        info!("Reverting migration: {}", unit.name);
        self.execute(&unit, Direction::Down).await?;
        self.driver
            .record_reverted(&unit.name)
            .await
            .map_err(|e| ledger_write_error(&unit.name, e))?;
        info!("Migration reverted: {}", unit.name);

        Ok(Some(name))
    }

    /// Revert migrations one at a time until the ledger is empty.
    pub async fn down_all(&self) -> std::result::Result<MigrationRunResult, RunError> {
        let start = Instant::now();
        let mut completed = Vec::new();

        loop {
            match self.step_down().await {
                Ok(Some(name)) => completed.push(name),
                Ok(None) => break,
                Err(e) => return Err(RunError::new(completed, e)),
            }
        }

        info!("Reverted {} migration(s)", completed.len());
        Ok(MigrationRunResult {
            direction: Direction::Down,
            completed,
            elapsed: start.elapsed(),
        })
    }

    /// Name of the most recently applied migration.
    pub async fn current_version(&self) -> Result<Option<String>> {
        self.ensure_ledger().await?;
        self.ledger.latest().await
    }

    /// Applied entries alongside pending units.
    pub async fn status(&self) -> Result<MigrationStatus> {
        self.ensure_ledger().await?;

        let units = self.store.discover()?;
        let entries = self.ledger.entries().await?;

        let applied = entries
            .into_iter()
            .map(|entry| {
                let unit = units.iter().find(|u| u.name == entry.name);
                AppliedMigration {
                    on_disk: unit.is_some(),
                    has_down: unit.is_some_and(|u| !u.down.trim().is_empty()),
                    entry,
                }
            })
            .collect::<Vec<_>>();

        let pending = units
            .into_iter()
            .filter(|u| !applied.iter().any(|a| a.entry.name == u.name))
            .map(|u| u.name)
            .collect();

        Ok(MigrationStatus {
            current: applied.last().map(|a| a.entry.name.clone()),
            applied,
            pending,
        })
    }

    /// Units on disk that are not in the ledger, in store order.
    async fn pending(&self) -> Result<Vec<MigrationUnit>> {
        let units = self.store.discover()?;
        let applied = self.ledger.applied_names().await?;
        Ok(units
            .into_iter()
            .filter(|u| !applied.contains(&u.name))
            .collect())
    }

    async fn apply(&self, unit: &MigrationUnit) -> Result<()> {
        info!("Applying migration: {}", unit.name);
        self.execute(unit, Direction::Up).await?;
        self.driver
            .record_applied(&unit.name)
            .await
            .map_err(|e| ledger_write_error(&unit.name, e))?;
        info!("Migration applied: {}", unit.name);
        Ok(())
    }

    async fn execute(&self, unit: &MigrationUnit, direction: Direction) -> Result<()> {
        let script = unit.script(direction);
        if script.trim().is_empty() {
            debug!("No {} script for {}, nothing to execute", direction, unit.name);
            return Ok(());
        }

        self.driver
            .execute(script)
            .await
            .map_err(|e| KeelError::MigrationExecution {
                unit: unit.name.clone(),
                cause: e.to_string(),
            })
    }
}

/// Attribute a failed ledger insert or delete to its unit. Duplicates already
/// carry the name.
fn ledger_write_error(unit: &str, err: KeelError) -> KeelError {
    match err {
        KeelError::DuplicateMigration { .. } => err,
        other => KeelError::LedgerWrite {
            unit: unit.to_string(),
            cause: other.to_string(),
        },
    }
}
