//! Read model over the driver's ledger table.

use std::collections::HashSet;
use std::sync::Arc;

use keel_core::error::Result;
use keel_core::migration::LedgerEntry;

use crate::driver::Driver;

/// Answers "what is applied" for the runner.
#[derive(Clone)]
pub struct Ledger {
    driver: Arc<dyn Driver>,
}

impl Ledger {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self { driver }
    }

    /// Applied entries, oldest first.
    pub async fn entries(&self) -> Result<Vec<LedgerEntry>> {
        self.driver.entries().await
    }

    /// Names of every applied migration.
    pub async fn applied_names(&self) -> Result<HashSet<String>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    /// The most recently applied migration, if any.
    pub async fn latest(&self) -> Result<Option<String>> {
        self.driver.status().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryDriver;

    #[tokio::test]
    async fn test_applied_names_and_latest() {
        let driver = MemoryDriver::new();
        driver.create_table().await.unwrap();
        let ledger = Ledger::new(Arc::new(driver.clone()));

        assert!(ledger.applied_names().await.unwrap().is_empty());
        assert_eq!(ledger.latest().await.unwrap(), None);

        driver.record_applied("001_init").await.unwrap();
        driver.record_applied("002_users").await.unwrap();

        let names = ledger.applied_names().await.unwrap();
        assert!(names.contains("001_init"));
        assert!(names.contains("002_users"));
        assert_eq!(ledger.latest().await.unwrap().as_deref(), Some("002_users"));

        let entries = ledger.entries().await.unwrap();
        assert_eq!(entries[0].name, "001_init");
        assert!(entries[0].id < entries[1].id);
    }
}
