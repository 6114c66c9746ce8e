//! Configuration module for the echolog server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the echolog server
#[derive(Parser, Debug)]
#[command(name = "echolog")]
#[command(author = "echolog authors")]
#[command(version = "0.1.0")]
#[command(about = "A concurrent TCP logging echo server", long_about = None)]
pub struct CliArgs {
    /// Run as a daemon, detached from the controlling terminal
    #[arg(short = 'd', long)]
    pub daemon: bool,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// TCP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Path of the shared log file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// TCP port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Shared-log configuration
#[derive(Debug, Deserialize)]
pub struct LogConfig {
    /// Path of the shared log file
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    /// Interval between timestamp records in seconds
    #[serde(default = "default_timestamp_interval")]
    pub timestamp_interval: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            timestamp_interval: default_timestamp_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
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

fn default_port() -> u16 {
    9000
}

fn default_log_file() -> PathBuf {
    PathBuf::from("/var/tmp/echolog.data")
}

fn default_timestamp_interval() -> u64 {
    10 // seconds
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub daemon: bool,
    pub port: u16,
    pub log_file: PathBuf,
    pub timestamp_interval: u64,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::resolve(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence).
    fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Config {
        Config {
            daemon: cli.daemon,
            port: cli.port.unwrap_or(toml_config.server.port),
            log_file: cli.log_file.unwrap_or(toml_config.log.file),
            timestamp_interval: toml_config.log.timestamp_interval,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        }
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.log.file, PathBuf::from("/var/tmp/echolog.data"));
        assert_eq!(config.log.timestamp_interval, 10);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            port = 9100

            [log]
            file = "/tmp/echolog-test.data"
            timestamp_interval = 30

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.log.file, PathBuf::from("/tmp/echolog-test.data"));
        assert_eq!(config.log.timestamp_interval, 30);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let cli = CliArgs {
            daemon: true,
            config: None,
            port: Some(9200),
            log_file: None,
            log_level: "info".to_string(),
        };
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [server]
            port = 9100

            [log]
            file = "/tmp/echolog-test.data"

            [logging]
            level = "warn"
        "#,
        )
        .unwrap();

        let config = Config::resolve(cli, toml_config);
        assert!(config.daemon);
        assert_eq!(config.port, 9200);
        assert_eq!(config.log_file, PathBuf::from("/tmp/echolog-test.data"));
        assert_eq!(config.timestamp_interval, 10);
        assert_eq!(config.log_level, "warn");
    }
}
