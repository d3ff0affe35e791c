use std::path::Path;

use anyhow::Result;
use clap::Parser;
use console::style;

use keel_core::config::{KeelConfig, MigrationsConfig};
use keel_core::migration::Direction;
use keel_runtime::ScriptStore;

/// Create a new migration pair.
#[derive(Parser)]
pub struct MakeCommand {
    /// Short description, used as the file label.
    pub label: String,
}

impl MakeCommand {
    /// Works without a database. Falls back to default settings when no
    /// configuration file exists.
    pub fn execute(self, config_path: &Path) -> Result<()> {
        let config_dir = config_path.parent().unwrap_or(Path::new("."));

        let (folder, migrations) = if config_path.exists() {
            let config = KeelConfig::from_file(config_path)?;
            (config.resolve_folder(config_dir), config.migrations)
        } else {
            let migrations = MigrationsConfig::default();
            (config_dir.join(&migrations.folder), migrations)
        };
        migrations.validate()?;

        let store = ScriptStore::new(folder, format!(".{}", migrations.extension));
        let name = store.create(&self.label)?;

        println!("  {} Created migration {}", style("✓").green(), style(&name).cyan());
        for direction in [Direction::Up, Direction::Down] {
            println!(
                "    {} {}",
                style("→").dim(),
                store.script_path(&name, direction).display()
            );
        }
        Ok(())
    }
}
