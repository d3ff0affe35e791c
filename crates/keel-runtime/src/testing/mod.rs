//! Testing utilities for keel.
//!
//! [`MemoryDriver`] runs the engine against an in-memory ledger; pair it with
//! [`write_migration`] and a temporary folder to build migration fixtures.
//!
//! Tests against a live PostgreSQL or MySQL server are opt-in. They read their
//! URL from `TEST_POSTGRES_URL` / `TEST_MYSQL_URL` via [`database_url_from_env`]
//! and return early when it is unset. `DATABASE_URL` is never read here.

mod memory;

pub use memory::MemoryDriver;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;

static TABLE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Write `<name>.up.sql` and, when given, `<name>.down.sql` into `dir`.
pub fn write_migration(
    dir: &Path,
    name: &str,
    up: &str,
    down: Option<&str>,
) -> std::io::Result<()> {
    std::fs::write(dir.join(format!("{}.up.sql", name)), up)?;
    if let Some(down) = down {
        std::fs::write(dir.join(format!("{}.down.sql", name)), down)?;
    }
    Ok(())
}

/// Read a test database URL from `var`. `None` when unset or empty.
pub fn database_url_from_env(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(url) if !url.trim().is_empty() => Some(url),
        _ => {
            eprintln!("{} not set, skipping live database test", var);
            None
        }
    }
}

/// A table name no other test run shares, so parallel tests against one
/// server do not see each other's ledgers. Stays under the 63-byte PostgreSQL
/// identifier limit.
pub fn unique_table(prefix: &str) -> String {
    let prefix: String = prefix
        .chars()
        .take(16)
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    format!(
        "keel_{}_{}_{}_{}",
        prefix,
        std::process::id(),
        Utc::now().timestamp_micros(),
        TABLE_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::config::validate_identifier;

    #[test]
    fn test_unique_table_is_a_valid_identifier() {
        let a = unique_table("reseed top-row");
        let b = unique_table("reseed top-row");
        assert_ne!(a, b);
        assert!(a.starts_with("keel_reseed_top_row_"));
        assert!(unique_table("a_very_long_descriptive_test_name").len() < 63);
        validate_identifier(&a).unwrap();
    }

    #[test]
    fn test_database_url_from_env_unset() {
        assert_eq!(database_url_from_env("KEEL_TEST_URL_THAT_IS_NEVER_SET"), None);
    }
}
