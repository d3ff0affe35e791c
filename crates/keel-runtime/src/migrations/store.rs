//! Migration script discovery.
//!
//! A migration folder holds files named `<orderKey>_<label>.<up|down><ext>`,
//! for example `001_init.up.sql` and `001_init.down.sql`. A unit needs at least
//! one of the two; a missing direction is a no-op. Units are ordered by their
//! order key, which must be unique across the folder.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use keel_core::error::{KeelError, Result};
use keel_core::migration::{Direction, MigrationUnit};

/// Reads migration units from a folder.
///
/// Holds no state beyond its location: every [`ScriptStore::discover`] call
/// re-reads the folder, so an unchanged folder always yields the same sequence.
#[derive(Debug, Clone)]
pub struct ScriptStore {
    folder: PathBuf,
    extension: String,
}

impl ScriptStore {
    /// Create a store for `folder`. `extension` includes the leading dot.
    pub fn new(folder: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            extension: extension.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Load every unit in the folder, sorted ascending by order key.
    pub fn discover(&self) -> Result<Vec<MigrationUnit>> {
        if !self.folder.is_dir() {
            return Err(KeelError::NotFound(format!(
                "Migration folder '{}' does not exist",
                self.folder.display()
            )));
        }

        let entries = fs::read_dir(&self.folder).map_err(|e| self.read_error(&self.folder, e))?;

        let mut scripts: BTreeMap<String, (Option<String>, Option<String>)> = BTreeMap::new();

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
                debug!("Skipping non UTF-8 file name {:?}", path);
                continue;
            };

            let Some((name, direction)) = self.parse_file_name(file_name)? else {
                debug!("Skipping {}: not a {} migration", file_name, self.extension);
                continue;
            };

            let body = fs::read_to_string(&path).map_err(|e| self.read_error(&path, e))?;
            let slot = scripts.entry(name).or_default();
            match direction {
                Direction::Up => slot.0 = Some(body),
                Direction::Down => slot.1 = Some(body),
            }
        }

        let mut units: Vec<MigrationUnit> = scripts
            .into_iter()
            .map(|(name, (up, down))| {
                MigrationUnit::new(name, up.unwrap_or_default(), down.unwrap_or_default())
            })
            .collect();

        units.sort_by(|a, b| a.order_key().cmp(b.order_key()).then_with(|| a.name.cmp(&b.name)));

        if let Some(pair) = units.windows(2).find(|w| w[0].order_key() == w[1].order_key()) {
            return Err(KeelError::AmbiguousMigration {
                key: pair[0].order_key().to_string(),
                first: pair[0].name.clone(),
                second: pair[1].name.clone(),
            });
        }

        debug!(
            "Discovered {} migrations in {}",
            units.len(),
            self.folder.display()
        );
        Ok(units)
    }

    /// Look up one unit by name.
    pub fn find(&self, name: &str) -> Result<Option<MigrationUnit>> {
        Ok(self.discover()?.into_iter().find(|u| u.name == name))
    }

    /// Write an empty up/down pair for a new migration and return its name.
    ///
    /// The order key is the current UTC time down to microseconds.
    pub fn create(&self, label: &str) -> Result<String> {
        let label = normalize_label(label);
        if label.is_empty() {
            return Err(KeelError::InvalidArgument(
                "Migration label must contain letters or digits".to_string(),
            ));
        }

        fs::create_dir_all(&self.folder)?;

        let name = format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S%6f"), label);
        for direction in [Direction::Up, Direction::Down] {
            let path = self.script_path(&name, direction);
            let template = format!("-- Migration: {}\n-- Direction: {}\n", label, direction);

            fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .and_then(|mut file| std::io::Write::write_all(&mut file, template.as_bytes()))
                .map_err(|e| {
                    KeelError::InvalidArgument(format!(
                        "Failed to create {}: {}",
                        path.display(),
                        e
                    ))
                })?;
        }

        info!("Created migration {}", name);
        Ok(name)
    }

    /// Path of the script file for a unit and direction.
    pub fn script_path(&self, name: &str, direction: Direction) -> PathBuf {
        self.folder
            .join(format!("{}.{}{}", name, direction.marker(), self.extension))
    }

    /// Split a file name into unit name and direction.
    ///
    /// `Ok(None)` for files without this store's extension; an error for files
    /// that carry the extension but not the naming convention.
    fn parse_file_name(&self, file_name: &str) -> Result<Option<(String, Direction)>> {
        let Some(stem) = file_name.strip_suffix(self.extension.as_str()) else {
            return Ok(None);
        };

        let parsed = [Direction::Up, Direction::Down]
            .into_iter()
            .find_map(|direction| {
                stem.strip_suffix(direction.marker())
                    .and_then(|rest| rest.strip_suffix('.'))
                    .map(|name| (name, direction))
            });

        match parsed {
            Some((name, direction)) if !name.is_empty() => Ok(Some((name.to_string(), direction))),
            _ => Err(KeelError::InvalidMigration(format!(
                "'{}' must be named <key>_<label>.up{ext} or <key>_<label>.down{ext}",
                file_name,
                ext = self.extension
            ))),
        }
    }

    fn read_error(&self, path: &Path, e: std::io::Error) -> KeelError {
        if e.kind() == ErrorKind::NotFound {
            KeelError::NotFound(format!("{} does not exist", path.display()))
        } else {
            KeelError::Io(e)
        }
    }
}

/// Lowercase snake_case label for generated file names.
fn normalize_label(label: &str) -> String {
    label
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_migration;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> ScriptStore {
        ScriptStore::new(dir.path(), ".sql")
    }

    #[test]
    fn test_discover_missing_folder() {
        let store = ScriptStore::new("/nonexistent/keel/migrations", ".sql");
        assert!(matches!(store.discover(), Err(KeelError::NotFound(_))));
    }

    #[test]
    fn test_discover_empty_folder() {
        let dir = TempDir::new().unwrap();
        assert!(store(&dir).discover().unwrap().is_empty());
    }

    #[test]
    fn test_discover_pairs_sorted() {
        let dir = TempDir::new().unwrap();

        // Create migrations out of order
        write_migration(
            dir.path(),
            "003_posts",
            "CREATE TABLE posts(id int);",
            Some("DROP TABLE posts;"),
        )
        .unwrap();
        write_migration(
            dir.path(),
            "001_init",
            "CREATE TABLE t(x int);",
            Some("DROP TABLE t;"),
        )
        .unwrap();
        write_migration(
            dir.path(),
            "002_users",
            "CREATE TABLE users(id int);",
            Some("DROP TABLE users;"),
        )
        .unwrap();

        let units = store(&dir).discover().unwrap();
        let names: Vec<&str> = units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(names, vec!["001_init", "002_users", "003_posts"]);
        assert_eq!(units[0].up, "CREATE TABLE t(x int);");
        assert_eq!(units[0].down, "DROP TABLE t;");
    }

    #[test]
    fn test_discover_orders_by_key_not_full_name() {
        let dir = TempDir::new().unwrap();
        write_migration(dir.path(), "0010_later", "SELECT 2;", None).unwrap();
        write_migration(dir.path(), "001_earlier", "SELECT 1;", None).unwrap();

        let units = store(&dir).discover().unwrap();
        assert_eq!(units[0].name, "001_earlier");
        assert_eq!(units[1].name, "0010_later");
    }

    #[test]
    fn test_discover_missing_direction_is_noop() {
        let dir = TempDir::new().unwrap();
        write_migration(dir.path(), "001_seed", "INSERT INTO t VALUES (1);", None).unwrap();
        fs::write(dir.path().join("002_cleanup.down.sql"), "DELETE FROM t;").unwrap();

        let units = store(&dir).discover().unwrap();
        assert_eq!(units.len(), 2);
        assert!(units[0].down.is_empty());
        assert!(units[1].up.is_empty());
        assert_eq!(units[1].down, "DELETE FROM t;");
    }

    #[test]
    fn test_discover_ignores_other_extensions() {
        let dir = TempDir::new().unwrap();
        write_migration(dir.path(), "001_init", "SELECT 1;", None).unwrap();
        fs::write(dir.path().join("readme.txt"), "Not a migration").unwrap();
        fs::write(dir.path().join("001_init.up.sql.bak"), "Backup").unwrap();
        fs::create_dir(dir.path().join("archive.sql")).unwrap();

        let units = store(&dir).discover().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "001_init");
    }

    #[test]
    fn test_discover_rejects_missing_direction_marker() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("001_init.sql"), "SELECT 1;").unwrap();

        assert!(matches!(
            store(&dir).discover(),
            Err(KeelError::InvalidMigration(_))
        ));
    }

    #[test]
    fn test_discover_rejects_duplicate_order_key() {
        let dir = TempDir::new().unwrap();
        write_migration(dir.path(), "001_init", "SELECT 1;", None).unwrap();
        write_migration(dir.path(), "001_other", "SELECT 2;", None).unwrap();

        match store(&dir).discover() {
            Err(KeelError::AmbiguousMigration { key, first, second }) => {
                assert_eq!(key, "001");
                assert_eq!(first, "001_init");
                assert_eq!(second, "001_other");
            }
            other => panic!("expected ambiguity error, got {:?}", other),
        }
    }

    #[test]
    fn test_discover_is_repeatable() {
        let dir = TempDir::new().unwrap();
        write_migration(dir.path(), "001_init", "SELECT 1;", Some("SELECT 0;")).unwrap();
        write_migration(dir.path(), "002_next", "SELECT 2;", None).unwrap();

        let store = store(&dir);
        assert_eq!(store.discover().unwrap(), store.discover().unwrap());
    }

    #[test]
    fn test_custom_extension() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("001_init.up.pgsql"), "SELECT 1;").unwrap();
        fs::write(dir.path().join("002_other.up.sql"), "SELECT 2;").unwrap();

        let units = ScriptStore::new(dir.path(), ".pgsql").discover().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "001_init");
    }

    #[test]
    fn test_find() {
        let dir = TempDir::new().unwrap();
        write_migration(dir.path(), "001_init", "SELECT 1;", Some("SELECT 0;")).unwrap();

        let store = store(&dir);
        assert_eq!(store.find("001_init").unwrap().unwrap().down, "SELECT 0;");
        assert!(store.find("002_missing").unwrap().is_none());
    }

    #[test]
    fn test_create_writes_pair() {
        let dir = TempDir::new().unwrap();
        let store = ScriptStore::new(dir.path().join("migrations"), ".sql");

        let name = store.create("Add Users Table").unwrap();
        assert!(name.ends_with("_add_users_table"));
        assert!(store.script_path(&name, Direction::Up).exists());
        assert!(store.script_path(&name, Direction::Down).exists());

        let units = store.discover().unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, name);
        assert_eq!(units[0].order_key().len(), 20);
    }

    #[test]
    fn test_create_rejects_empty_label() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            store(&dir).create(" -- "),
            Err(KeelError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("Add users"), "add_users");
        assert_eq!(normalize_label("  create--posts!! "), "create_posts");
        assert_eq!(normalize_label("v2 index"), "v2_index");
    }
}
