use std::fs;
use std::path::Path;

use anyhow::Result;
use clap::Parser;
use console::style;

use keel_core::config::KeelConfig;

/// Create a starter configuration.
#[derive(Parser)]
pub struct InitCommand {
    /// Migrations folder to create.
    #[arg(short, long, default_value = "migrations")]
    pub dir: String,

    /// Overwrite an existing configuration file.
    #[arg(long)]
    pub force: bool,
}

impl InitCommand {
    pub fn execute(self, config_path: &Path) -> Result<()> {
        if config_path.exists() && !self.force {
            anyhow::bail!(
                "Configuration file already exists: {}\nUse --force to overwrite it.",
                config_path.display()
            );
        }

        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let content = KeelConfig::template().replace(
            "folder = \"migrations\"",
            &format!("folder = \"{}\"", self.dir.replace('\\', "/")),
        );
        fs::write(config_path, content)?;

        let base = config_path.parent().unwrap_or(Path::new("."));
        fs::create_dir_all(base.join(&self.dir))?;

        println!(
            "  {} Created {}",
            style("✓").green(),
            style(config_path.display()).cyan()
        );
        println!(
            "  {} Migrations folder: {}",
            style("ℹ").blue(),
            base.join(&self.dir).display()
        );
        Ok(())
    }
}
