//! Configuration for the version trimmer.
//!
//! Configured via a TOML file, with support for environment variable
//! interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [remote]
//! base_url = "https://contoso.example.com"
//! auth_token_env = "VERTRIM_TOKEN"
//!
//! [trim]
//! older_than_days = 180
//! libraries = ["Shared Documents"]
//! ```

mod logging;
mod logs;
mod remote;
mod trim;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use logging::*;
pub use logs::*;
pub use remote::*;
pub use trim::*;

/// Root configuration.
///
/// Every section is optional with defaults; `remote.base_url` is the only
/// setting a command that talks to the API cannot run without.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VertrimConfig {
    /// Remote API connection.
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Trim run options and safety rails.
    #[serde(default)]
    pub trim: TrimConfig,

    /// Log and state file locations.
    #[serde(default)]
    pub logs: LogsConfig,

    /// Console logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl VertrimConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let mut config: VertrimConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    ///
    /// Public because CLI flags merge on top of the file and the result
    /// must be re-checked.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.remote.validate().map_err(ConfigError::Validation)?;
        self.trim.validate().map_err(ConfigError::Validation)?;

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
///
/// Variables inside comments (after `#` on a line) are left alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("static pattern");
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let whole = cap.get(0).expect("capture 0 always present");

            // Skip if this variable is inside a comment
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}
