//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.
//! Environment variables are layered on top by [`Config::apply_env`].

use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable holding the Redmine base URL.
pub const ENV_REDMINE_URL: &str = "REDMINE_URL";
/// Environment variable holding the Redmine API key.
pub const ENV_REDMINE_API_KEY: &str = "REDMINE_API_KEY";
/// Environment variable naming a file of extra instructions for `redmine_request`.
pub const ENV_REQUEST_INSTRUCTIONS: &str = "REDMINE_REQUEST_INSTRUCTIONS";
/// Environment variable holding the liveness port.
pub const ENV_PORT: &str = "PORT";

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Base URL of the Redmine instance, e.g. `https://redmine.example.com/`.
    #[serde(default)]
    pub redmine_url: Option<String>,

    /// Redmine REST API key, sent as `X-Redmine-API-Key`.
    #[serde(default)]
    pub api_key: Option<String>,

    /// File whose contents are appended to the `redmine_request` tool description.
    #[serde(default)]
    pub request_instructions_path: Option<PathBuf>,

    /// External OpenAPI document. The embedded document is used when unset.
    #[serde(default)]
    pub openapi_path: Option<PathBuf>,

    /// Timeout for every outbound request, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Liveness endpoint settings.
    #[serde(default)]
    pub health: HealthConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Problems found while applying the environment, reported once logging is up.
    #[serde(skip)]
    warnings: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            _schema: None,
            _comment: None,
            redmine_url: None,
            api_key: None,
            request_instructions_path: None,
            openapi_path: None,
            timeout_secs: default_timeout_secs(),
            health: HealthConfig::default(),
            logging: LoggingConfig::default(),
            warnings: Vec::new(),
        }
    }
}

impl Config {
    /// Overrides file settings with values from the environment.
    ///
    /// `lookup` is normally `std::env::var(..).ok()`; tests pass a map.
    ///
    /// An unparsable `PORT` keeps the configured liveness port and is
    /// recorded in [`Config::warnings`].
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_REDMINE_URL) {
            self.redmine_url = Some(url);
        }
        if let Some(key) = lookup(ENV_REDMINE_API_KEY) {
            self.api_key = Some(key);
        }
        // An empty value explicitly disables the instructions.
        if let Some(path) = lookup(ENV_REQUEST_INSTRUCTIONS) {
            self.request_instructions_path = if path.is_empty() {
                None
            } else {
                Some(PathBuf::from(path))
            };
        }
        if let Some(port) = lookup(ENV_PORT) {
            match port.trim().parse() {
                Ok(port) => self.health.port = port,
                Err(_) => self.warnings.push(format!(
                    "{ENV_PORT} is not a port number ('{port}'), using port {}",
                    self.health.port
                )),
            }
        }
    }

    /// Non-fatal problems found while loading.
    #[must_use]
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = non_empty(self.redmine_url.as_deref()).ok_or(ConfigError::Missing {
            name: "redmine_url",
            env: ENV_REDMINE_URL,
        })?;
        non_empty(self.api_key.as_deref()).ok_or(ConfigError::Missing {
            name: "api_key",
            env: ENV_REDMINE_API_KEY,
        })?;

        parse_base_url(url)?;

        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "timeout_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Resolves the settings needed to talk to Redmine.
    ///
    /// Reads the request instructions file, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a required setting is missing, the URL is invalid,
    /// or the instructions file cannot be read.
    pub fn connection(&self) -> Result<Connection, ConfigError> {
        self.validate()?;

        let base_url = parse_base_url(self.redmine_url.as_deref().unwrap_or_default())?;
        let api_key = self.api_key.clone().unwrap_or_default();

        let request_instructions = match &self.request_instructions_path {
            Some(path) => {
                std::fs::read_to_string(path).map_err(|e| ConfigError::InstructionsError {
                    path: path.clone(),
                    source: e,
                })?
            }
            None => String::new(),
        };

        Ok(Connection {
            base_url,
            api_key,
            timeout: Duration::from_secs(self.timeout_secs),
            request_instructions,
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw.trim()).map_err(|e| ConfigError::ValidationError {
        message: format!("redmine_url is not a valid URL: {e}"),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::ValidationError {
            message: format!("redmine_url must use http or https, got '{}'", url.scheme()),
        });
    }
    Ok(url)
}

/// Resolved Redmine connection settings.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Base URL every request path is joined onto.
    pub base_url: Url,
    /// API key sent with every request.
    pub api_key: String,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Free text appended to the `redmine_request` tool description.
    pub request_instructions: String,
}

const fn default_timeout_secs() -> u64 {
    60
}

/// Liveness endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether to start the liveness endpoint at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// TCP port, bound on all interfaces.
    #[serde(default = "default_health_port")]
    pub port: u16,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            port: default_health_port(),
        }
    }
}

const fn default_true() -> bool {
    true
}

const fn default_health_port() -> u16 {
    8080
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}
