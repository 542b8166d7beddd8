//! Startup error types for redmine-mcp.
//!
//! Everything in here is fatal: the process refuses to start rather than
//! serving tools against a half-configured Redmine connection.
//!
//! # Security Note
//!
//! Error messages never include the API key. Validation failures describe
//! the offending setting by name only.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// A required setting was not provided by the file or the environment.
    #[error("missing required setting '{name}' (set {env} or add it to the config file)")]
    Missing {
        /// Config file key.
        name: &'static str,
        /// Environment variable that can supply it.
        env: &'static str,
    },

    /// The request instructions file could not be read.
    #[error("failed to read request instructions file: {path}")]
    InstructionsError {
        /// Path to the instructions file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised while loading the OpenAPI document.
#[derive(Error, Debug)]
pub enum DocumentError {
    /// The document file could not be read.
    #[error("failed to read OpenAPI document: {path}")]
    ReadError {
        /// Path to the document.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid YAML or does not have the expected shape.
    #[error("failed to parse OpenAPI document: {origin}")]
    ParseError {
        /// Where the document came from (a path, or "embedded").
        origin: String,
        /// The underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },
}
