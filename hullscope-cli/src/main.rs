//! Hullscope CLI - Command-line interface
//!
//! Replays recorded slider sessions through the analysis pipeline and
//! manages the configuration file.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hullscope::config::{config_file_path, HullscopeConfig};
use hullscope::logging::{init_logging, LoggingGuard, DEFAULT_LOG_FILE};

use commands::config::ConfigCommands;
use error::CliError;

#[derive(Parser)]
#[command(name = "hullscope")]
#[command(about = "Geodesic buffer and convex hull analysis over map features", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded slider session and report the committed results
    Replay {
        /// Scenario JSON file
        scenario: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect or create the configuration file
    #[command(subcommand)]
    Config(ConfigCommands),
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        e.exit();
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli.config.unwrap_or_else(config_file_path);

    match cli.command {
        Commands::Config(command) => commands::config::run(command, &config_path),
        Commands::Replay { scenario, json } => {
            let config = HullscopeConfig::load_from(&config_path)?;
            let _logging = start_logging(&config)?;
            commands::replay::run(&scenario, json, &config)
        }
    }
}

fn start_logging(config: &HullscopeConfig) -> Result<LoggingGuard, CliError> {
    let guard = init_logging(
        &config.logging.directory,
        DEFAULT_LOG_FILE,
        &config.logging.filter,
    )
    .map_err(|e| CliError::LoggingInit(e.to_string()))?;
    tracing::info!(log = %guard.log_path().display(), "Logging initialized");
    Ok(guard)
}
