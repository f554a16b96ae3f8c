use anyhow::{Context, Result};
use serde::Deserialize;
use solwatch_connector::config::TrackerConfig;

/// The top-level configuration for the solwatch daemon.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct DaemonConfig {
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub daemon: DaemonSpecificConfig,
}

/// Contains settings that are unique to the daemon binary.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct DaemonSpecificConfig {
    /// Logging configuration.
    #[serde(default)]
    pub log: LogConfig,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LogConfig {
    /// Log level, e.g., "info", "debug", "trace".
    pub level: String,
    /// Log output format.
    pub format: LogFormat,
    /// Log output destination.
    pub output: LogOutput,
    /// Path to the log file, required if output is "file".
    pub file_path: Option<String>,
}

/// Defines the format for log messages.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    Plain,
    Json,
}

/// Defines the destination for log output.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum LogOutput {
    Stdout,
    File,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Plain,
            output: LogOutput::Stdout,
            file_path: None,
        }
    }
}

/// Loads the daemon configuration from a specified TOML file.
///
/// It uses the `config` crate to read the file and deserialize it into the
/// `DaemonConfig` struct. `SOLWATCH__`-prefixed environment variables take
/// precedence over file values.
pub fn load_config(path: &str) -> Result<DaemonConfig> {
    let builder = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("SOLWATCH").separator("__"));

    let settings: DaemonConfig = builder
        .build()
        .context(format!("Failed to build configuration from '{}'", path))?
        .try_deserialize()
        .context("Failed to deserialize configuration")?;

    Ok(settings)
}
