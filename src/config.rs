//! Configuration for the ctrl-httpd binary.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::server::ServerOptions;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the listener
#[derive(Parser, Debug)]
#[command(name = "ctrl-httpd")]
#[command(author = "ctrl-httpd authors")]
#[command(version)]
#[command(about = "A minimal embedded HTTP listener", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server name used in logs and thread names
    #[arg(short, long)]
    pub name: Option<String>,

    /// Address to bind to (empty for all interfaces)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_name")]
    pub name: String,
    /// Address to bind to
    #[serde(default)]
    pub listen: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            listen: String::new(),
            port: default_port(),
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

fn default_name() -> String {
    "ctrl-httpd".to_string()
}

fn default_port() -> u16 {
    1111
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub name: String,
    pub listen: String,
    pub port: u16,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_cli(CliArgs::parse())
    }

    /// Resolve parsed CLI args, reading the TOML file they point at.
    pub fn from_cli(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args over TOML values (CLI takes precedence).
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            name: cli.name.unwrap_or(toml_config.server.name),
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            port: cli.port.unwrap_or(toml_config.server.port),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            name: self.name.clone(),
            listen_address: self.listen.clone(),
            port: self.port,
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

    fn cli(args: &[&str]) -> CliArgs {
        let mut argv = vec!["ctrl-httpd"];
        argv.extend_from_slice(args);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = Config::merge(cli(&[]), TomlConfig::default());
        assert_eq!(config.name, "ctrl-httpd");
        assert_eq!(config.listen, "");
        assert_eq!(config.port, 1111);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.server_options(), ServerOptions::default());
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            name = "arm-controller"
            listen = "10.0.0.2"
            port = 5800

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.name, "arm-controller");
        assert_eq!(config.server.listen, "10.0.0.2");
        assert_eq!(config.server.port, 5800);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TomlConfig = toml::from_str("[server]\nport = 8080\n").unwrap();
        assert_eq!(config.server.name, "ctrl-httpd");
        assert_eq!(config.server.listen, "");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig =
            toml::from_str("[server]\nname = \"file\"\nport = 8080\n[logging]\nlevel = \"warn\"\n")
                .unwrap();
        let config = Config::merge(
            cli(&["--port", "9090", "-l", "127.0.0.1", "--log-level", "trace"]),
            toml_config,
        );

        assert_eq!(config.name, "file");
        assert_eq!(config.listen, "127.0.0.1");
        assert_eq!(config.port, 9090);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_missing_config_file() {
        let err = Config::from_cli(cli(&["--config", "/nonexistent/ctrl-httpd.toml"])).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(..)));
    }
}
