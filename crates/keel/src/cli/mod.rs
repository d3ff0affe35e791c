mod init;
mod make;
mod migrate;

pub use init::InitCommand;
pub use make::MakeCommand;
pub use migrate::StatusCommand;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// KEEL - SQL schema migrations
#[derive(Parser)]
#[command(name = "keel")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path.
    #[arg(short, long, default_value = "keel.toml", global = true)]
    pub config: PathBuf,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Create a starter keel.toml and migrations folder.
    Init(InitCommand),

    /// Apply all pending migrations.
    Up,

    /// Apply the oldest pending migration.
    UpOne,

    /// Revert the most recently applied migration.
    Down,

    /// Revert every applied migration.
    Reset,

    /// Show applied and pending migrations.
    Status(StatusCommand),

    /// Print the most recently applied migration.
    Current,

    /// Create a new empty migration pair.
    Make(MakeCommand),
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        init_tracing(self.verbose);

        // Load .env if present
        dotenvy::dotenv().ok();

        match self.command {
            Commands::Init(cmd) => cmd.execute(&self.config),
            Commands::Make(cmd) => cmd.execute(&self.config),
            Commands::Up => migrate::up(&self.config).await,
            Commands::UpOne => migrate::up_one(&self.config).await,
            Commands::Down => migrate::down(&self.config).await,
            Commands::Reset => migrate::reset(&self.config).await,
            Commands::Status(cmd) => cmd.execute(&self.config).await,
            Commands::Current => migrate::current(&self.config).await,
        }
    }
}

/// Logs go to stderr so command output stays pipeable.
fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()))
        .with_writer(std::io::stderr)
        .try_init();
}
