//! Migration data model shared by the script store, drivers and runner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One versioned schema change discovered on disk.
///
/// Units are rebuilt on every scan and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationUnit {
    /// Filename stem without the direction marker (e.g. "001_init").
    pub name: String,
    /// Forward script body. Empty means no-op.
    pub up: String,
    /// Reverse script body. Empty means no-op.
    pub down: String,
}

impl MigrationUnit {
    pub fn new(name: impl Into<String>, up: impl Into<String>, down: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            up: up.into(),
            down: down.into(),
        }
    }

    /// The ordering key: everything before the first `_`, or the whole name.
    pub fn order_key(&self) -> &str {
        order_key(&self.name)
    }

    /// Script body for the given direction.
    pub fn script(&self, direction: Direction) -> &str {
        match direction {
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }
}

/// Extract the ordering key from a unit name.
pub fn order_key(name: &str) -> &str {
    name.split_once('_').map(|(key, _)| key).unwrap_or(name)
}

/// One applied-migration row in the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Surrogate key assigned by the backend.
    pub id: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// Migration direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    /// Filename marker used by the script store.
    pub fn marker(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.marker())
    }
}
