use std::path::Path;

use anyhow::Result;
use clap::Parser;
use console::style;
use tracing::debug;

use keel_core::config::KeelConfig;
use keel_core::error::RunError;
use keel_runtime::{Database, MigrationRunResult, Runner};

/// Show migration status.
#[derive(Parser)]
pub struct StatusCommand {
    /// Print status as JSON.
    #[arg(long)]
    pub json: bool,
}

/// An open connection and the runner built on it.
struct Session {
    db: Database,
    runner: Runner,
}

impl Session {
    async fn open(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            anyhow::bail!(
                "Configuration file not found: {}\nRun `keel init` to create one.",
                config_path.display()
            );
        }

        let config = KeelConfig::from_file(config_path)?;
        let config_dir = config_path.parent().unwrap_or(Path::new("."));
        let mut migrations = config.migrations.clone();
        migrations.folder = config.resolve_folder(config_dir);
        debug!("Using migrations folder {}", migrations.folder.display());

        let db = Database::from_config(&config.database).await?;
        let driver = db.driver(&migrations)?;
        let runner = Runner::new(driver, &migrations);
        runner.ensure_ledger().await?;

        Ok(Self { db, runner })
    }

    async fn close(self) {
        self.db.close().await;
    }
}

fn header(title: &str) {
    println!();
    println!("  {}  {}", style("KEEL").bold().cyan(), title);
    println!();
}

fn report_applied(result: &MigrationRunResult, verb: &str) {
    if result.completed.is_empty() {
        println!("  {} Nothing to do", style("ℹ").blue());
    } else {
        for name in &result.completed {
            println!("  {} {}: {}", style("✓").green(), verb, name);
        }
        println!();
        println!(
            "  {} {} {} migration(s) in {:.2?}",
            style("✓").green(),
            verb,
            result.count(),
            result.elapsed
        );
    }
    println!();
}

/// Print the units that finished before the failure, then hand the error back.
fn report_failure(err: RunError, verb: &str) -> anyhow::Error {
    for name in &err.completed {
        println!("  {} {}: {}", style("✓").green(), verb, name);
    }
    if let Some(unit) = err.unit() {
        println!("  {} Failed: {}", style("✗").red(), unit);
    }
    println!();
    err.into()
}

pub async fn up(config_path: &Path) -> Result<()> {
    let session = Session::open(config_path).await?;
    header("Migrations");
    println!("  {} Running pending migrations...", style("→").dim());

    let result = session.runner.up_all().await;
    session.close().await;
    report_applied(&result.map_err(|e| report_failure(e, "Applied"))?, "Applied");
    Ok(())
}

pub async fn up_one(config_path: &Path) -> Result<()> {
    let session = Session::open(config_path).await?;
    header("Migrations");

    let result = session.runner.up_one().await;
    session.close().await;
    report_applied(&result.map_err(|e| report_failure(e, "Applied"))?, "Applied");
    Ok(())
}

pub async fn down(config_path: &Path) -> Result<()> {
    let session = Session::open(config_path).await?;
    header("Migrations");

    let result = session.runner.step_down().await;
    session.close().await;
    match result? {
        Some(name) => println!("  {} Rolled back: {}", style("✓").green(), name),
        None => println!("  {} No migrations to rollback", style("ℹ").blue()),
    }
    println!();
    Ok(())
}

pub async fn reset(config_path: &Path) -> Result<()> {
    let session = Session::open(config_path).await?;
    header("Migrations");
    println!("  {} Rolling back all migrations...", style("→").dim());

    let result = session.runner.down_all().await;
    session.close().await;
    report_applied(
        &result.map_err(|e| report_failure(e, "Rolled back"))?,
        "Rolled back",
    );
    Ok(())
}

pub async fn current(config_path: &Path) -> Result<()> {
    let session = Session::open(config_path).await?;
    let current = session.runner.current_version().await;
    session.close().await;

    match current? {
        Some(name) => println!("{}", name),
        None => println!("{}", style("(none)").dim()),
    }
    Ok(())
}

impl StatusCommand {
    pub async fn execute(self, config_path: &Path) -> Result<()> {
        let session = Session::open(config_path).await?;
        let status = session.runner.status().await;
        session.close().await;
        let status = status?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&status)?);
            return Ok(());
        }

        header("Migration Status");

        if status.applied.is_empty() && status.pending.is_empty() {
            println!("  {} No migrations found", style("ℹ").blue());
            return Ok(());
        }

        if !status.applied.is_empty() {
            println!("  {} Applied:", style("✓").green());
            for m in &status.applied {
                let marker = if !m.on_disk {
                    style("!").red().to_string()
                } else if m.has_down {
                    style("↓").green().to_string()
                } else {
                    style("-").dim().to_string()
                };
                println!(
                    "    {} {} {} ({})",
                    marker,
                    style(&m.entry.name).cyan(),
                    style("at").dim(),
                    m.entry.applied_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
        }

        if !status.pending.is_empty() {
            if !status.applied.is_empty() {
                println!();
            }
            println!("  {} Pending:", style("○").yellow());
            for name in &status.pending {
                println!("    {} {}", style("→").dim(), style(name).yellow());
            }
        }

        println!();
        println!(
            "  {} {} applied, {} pending",
            style("ℹ").blue(),
            status.applied.len(),
            status.pending.len()
        );
        println!();

        println!(
            "  {} = has down migration, {} = no down migration, {} = missing on disk",
            style("↓").green(),
            style("-").dim(),
            style("!").red()
        );
        println!();
        Ok(())
    }
}
