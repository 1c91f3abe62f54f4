//! Configuration CLI commands.
//!
//! Provides `config path`, `config show`, and `config init` for inspecting
//! and creating the configuration file.

use std::path::Path;

use clap::Subcommand;
use hullscope::config::HullscopeConfig;

use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the configuration file path
    Path,

    /// Print the effective configuration
    Show,

    /// Write a configuration file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand against the file at `path`.
pub fn run(command: ConfigCommands, path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Path => {
            println!("{}", path.display());
            Ok(())
        }
        ConfigCommands::Show => {
            let config = HullscopeConfig::load_from(path)?;
            print!("{}", config.to_ini_string());
            Ok(())
        }
        ConfigCommands::Init { force } => {
            write_defaults(path, force)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
    }
}

fn write_defaults(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::FileExists(path.display().to_string()));
    }
    HullscopeConfig::default().save_to(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_loadable_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("hullscope.ini");

        write_defaults(&path, false).unwrap();

        let loaded = HullscopeConfig::load_from(&path).unwrap();
        assert_eq!(loaded, HullscopeConfig::default());
    }

    #[test]
    fn test_init_refuses_to_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("hullscope.ini");
        std::fs::write(&path, "[analysis]\ndebounce_ms = 400\n").unwrap();

        assert!(matches!(
            write_defaults(&path, false),
            Err(CliError::FileExists(_))
        ));
        write_defaults(&path, true).unwrap();
        assert_eq!(
            HullscopeConfig::load_from(&path).unwrap().analysis.debounce_ms,
            250
        );
    }
}
