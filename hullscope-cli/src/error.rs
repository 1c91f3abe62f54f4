//! CLI error handling with user-friendly messages.
//!
//! Centralizes error handling for the CLI, providing consistent formatting
//! and appropriate exit codes.

use std::fmt;
use std::process;

use hullscope::config::ConfigFileError;
use hullscope::session::SessionError;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration error
    Config(ConfigFileError),
    /// Failed to start the async runtime
    Runtime(std::io::Error),
    /// Failed to read a scenario file
    ScenarioRead { path: String, error: std::io::Error },
    /// Scenario file is not valid
    ScenarioParse { path: String, reason: String },
    /// Failed to start the analysis session
    Session(SessionError),
    /// Refused to overwrite an existing file
    FileExists(String),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        match self {
            CliError::ScenarioParse { .. } => {
                eprintln!();
                eprintln!("A scenario is a JSON object with:");
                eprintln!("  extent    {{min_lat, max_lat, min_lng, max_lng}} (optional)");
                eprintln!("  features  [{{lat, lng}}, ...]");
                eprintln!("  inputs    [{{at_ms, value}}, ...]");
            }
            CliError::FileExists(_) => {
                eprintln!();
                eprintln!("Use --force to overwrite it.");
            }
            _ => {}
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "Configuration error: {}", e),
            CliError::Runtime(e) => write!(f, "Failed to start async runtime: {}", e),
            CliError::ScenarioRead { path, error } => {
                write!(f, "Failed to read scenario '{}': {}", path, error)
            }
            CliError::ScenarioParse { path, reason } => {
                write!(f, "Invalid scenario '{}': {}", path, reason)
            }
            CliError::Session(e) => write!(f, "Failed to start analysis session: {}", e),
            CliError::FileExists(path) => write!(f, "File already exists: {}", path),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(e) => Some(e),
            CliError::Runtime(e) => Some(e),
            CliError::ScenarioRead { error, .. } => Some(error),
            CliError::Session(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<SessionError> for CliError {
    fn from(e: SessionError) -> Self {
        CliError::Session(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scenario_parse_display() {
        let err = CliError::ScenarioParse {
            path: "run.json".to_string(),
            reason: "missing field `inputs`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid scenario 'run.json': missing field `inputs`"
        );
    }

    #[test]
    fn test_config_error_has_source() {
        use std::error::Error;

        let err = CliError::from(ConfigFileError::ParseError("bad".to_string()));
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("Configuration error:"));
    }
}
