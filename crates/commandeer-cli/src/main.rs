use clap::{Parser, Subcommand};
use commandeer_core::CommandeerConfig;
use std::path::PathBuf;

mod commands;
mod prompt;

use commands::history::HistoryCommand;
use commands::inventory::InventoryCommand;
use commands::plan::PlanArgs;
use commands::run::RunArgs;
use commands::templates::TemplatesCommand;

#[derive(Parser, Debug)]
#[command(
    name = "commandeer",
    version,
    about = "Push configuration commands to network devices with pre-checks, dry-run, and rollback"
)]
struct Cli {
    /// Configuration file. Missing file falls back to built-in defaults.
    #[arg(long, global = true, default_value = "commandeer.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute commands or a template across devices
    Run(RunArgs),

    /// Validate a plan offline, without connecting to any device
    Plan(PlanArgs),

    /// Device inventory
    Inventory {
        #[command(subcommand)]
        cmd: InventoryCommand,
    },

    /// Command templates
    Templates {
        #[command(subcommand)]
        cmd: TemplatesCommand,
    },

    /// Recorded run history
    History {
        #[command(subcommand)]
        cmd: HistoryCommand,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.cmd {
        Command::Run(args) => commands::run::run(args, &config).await,
        Command::Plan(args) => commands::plan::run(args, &config),
        Command::Inventory { cmd } => commands::inventory::run(cmd, &config),
        Command::Templates { cmd } => commands::templates::run(cmd, &config),
        Command::History { cmd } => commands::history::run(cmd, &config),
    }
}

fn load_config(path: &PathBuf) -> anyhow::Result<CommandeerConfig> {
    if path.exists() {
        Ok(CommandeerConfig::load(path)?)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(CommandeerConfig::default())
    }
}
