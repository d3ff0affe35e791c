use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{KeelError, Result};

/// Migration folder and ledger table configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationsConfig {
    /// Folder holding the migration scripts.
    #[serde(default = "default_folder")]
    pub folder: PathBuf,

    /// Ledger table name.
    #[serde(default = "default_table")]
    pub table: String,

    /// Script file extension, without the leading dot.
    #[serde(default = "default_extension")]
    pub extension: String,
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            folder: default_folder(),
            table: default_table(),
            extension: default_extension(),
        }
    }
}

impl MigrationsConfig {
    /// Config for a given folder with default table and extension.
    pub fn with_folder(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
            ..Default::default()
        }
    }

    /// Check the table name and extension before they reach any SQL or path.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.table)?;

        if self.extension.is_empty()
            || self.extension.starts_with('.')
            || self.extension.contains(['/', '\\'])
        {
            return Err(KeelError::Config(format!(
                "Invalid migration extension '{}'",
                self.extension
            )));
        }

        Ok(())
    }
}

/// Ledger table names are interpolated into SQL, so only plain identifiers pass.
pub fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(KeelError::Config(format!(
            "Invalid ledger table name '{}'",
            name
        )))
    }
}

fn default_folder() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_table() -> String {
    "migration".to_string()
}

fn default_extension() -> String {
    "sql".to_string()
}
