//! Configuration file loading and parsing.
//!
//! This module handles loading the configuration file from disk, layering
//! environment variables over it and validating the result.
//!
//! # Configuration Sources
//!
//! Settings are resolved in the following order (later wins):
//!
//! 1. Built-in defaults
//! 2. Configuration file:
//!    - Path specified on the command line, or
//!    - **Linux/macOS:** `~/.redmine-mcp/config.json`
//!    - **Windows:** `%USERPROFILE%\.redmine-mcp\config.json`
//! 3. Environment: `REDMINE_URL`, `REDMINE_API_KEY`,
//!    `REDMINE_REQUEST_INSTRUCTIONS`, `PORT`
//!
//! The default file is optional; an explicitly named file must exist.

mod settings;

pub use settings::{
    Config, Connection, HealthConfig, LoggingConfig, ENV_PORT, ENV_REDMINE_API_KEY,
    ENV_REDMINE_URL, ENV_REQUEST_INSTRUCTIONS,
};

use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Returns the default configuration directory.
///
/// - **Linux/macOS:** `~/.redmine-mcp/`
/// - **Windows:** `%USERPROFILE%\.redmine-mcp\`
#[must_use]
pub fn default_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".redmine-mcp"))
}

/// Returns the platform-specific default configuration file path.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    default_config_dir().map(|p| p.join("config.json"))
}

/// Loads the configuration file (if any), applies the process environment
/// and validates the result.
///
/// If `path` is `None`, the platform-specific default location is tried and
/// silently skipped when absent.
///
/// # Errors
///
/// Returns an error if:
/// - An explicitly given configuration file cannot be found
/// - The file cannot be read
/// - The JSON is malformed
/// - Required settings are missing or invalid
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => read_config_file(p)?,
        None => match default_config_path() {
            Some(p) if p.exists() => read_config_file(&p)?,
            _ => Config::default(),
        },
    };

    config.apply_env(|key| std::env::var(key).ok());

    // Validate the configuration
    config.validate()?;

    Ok(config)
}

/// Reads and parses a single configuration file without validating it.
///
/// # Errors
///
/// Returns an error if the file is missing, unreadable or malformed.
pub fn read_config_file(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    serde_json::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })
}
