//! Configuration for the wirechat binary.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

use crate::codec::{MAX_FRAME_LEN, MAX_MESSAGE_LEN};

/// Command-line arguments for the chat server and client
#[derive(Parser, Debug)]
#[command(name = "wirechat")]
#[command(version = "0.1.0")]
#[command(about = "A broadcast chat server and client", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: CliCommand,

    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Run the chat server
    Serve {
        /// Address to bind to (e.g., 127.0.0.1:7777)
        #[arg(short = 'l', long)]
        listen: Option<String>,
    },
    /// Connect to a chat server as a client
    Connect {
        /// Login name broadcast with every message
        login: String,

        /// Server address (e.g., 127.0.0.1:7777)
        #[arg(short, long)]
        addr: Option<String>,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub reactor: ReactorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_addr")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_addr(),
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Server address to connect to
    #[serde(default = "default_addr")]
    pub addr: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: default_addr(),
        }
    }
}

/// Reactor tuning knobs
#[derive(Debug, Deserialize)]
pub struct ReactorConfig {
    /// Capacity of each per-connection buffer in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Maximum number of simultaneous connections (server)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Maximum readiness events handled per poll return
    #[serde(default = "default_event_batch")]
    pub event_batch: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            max_connections: default_max_connections(),
            event_batch: default_event_batch(),
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

fn default_addr() -> String {
    "127.0.0.1:7777".to_string()
}

fn default_buffer_size() -> usize {
    // Exactly one maximum-size message
    MAX_MESSAGE_LEN
}

fn default_max_connections() -> usize {
    1024
}

fn default_event_batch() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_string()
}

/// What the binary was asked to run.
#[derive(Debug, Clone)]
pub enum Mode {
    Serve { listen: String },
    Connect { login: String, addr: String },
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub buffer_size: usize,
    pub max_connections: usize,
    pub event_batch: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();
        Self::resolve(cli)
    }

    fn resolve(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let mode = match cli.command {
            CliCommand::Serve { listen } => Mode::Serve {
                listen: listen.unwrap_or(toml_config.server.listen),
            },
            CliCommand::Connect { login, addr } => Mode::Connect {
                login,
                addr: addr.unwrap_or(toml_config.client.addr),
            },
        };

        let config = Config {
            mode,
            buffer_size: toml_config.reactor.buffer_size,
            max_connections: toml_config.reactor.max_connections,
            event_batch: toml_config.reactor.event_batch,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // The output buffer must be able to stage any legal message,
        // otherwise try_send could stall forever on a full-size frame.
        if self.buffer_size < MAX_MESSAGE_LEN {
            return Err(ConfigError::Invalid(format!(
                "buffer_size must be at least {MAX_MESSAGE_LEN}, got {}",
                self.buffer_size
            )));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be positive".to_string(),
            ));
        }
        if self.event_batch == 0 {
            return Err(ConfigError::Invalid(
                "event_batch must be positive".to_string(),
            ));
        }
        // The login travels as a frame with every message, so it is
        // bound by the same limit the server enforces on the wire.
        if let Mode::Connect { ref login, .. } = self.mode {
            if login.is_empty() || login.len() > MAX_FRAME_LEN {
                return Err(ConfigError::Invalid(format!(
                    "login must be between 1 and {MAX_FRAME_LEN} bytes, got {}",
                    login.len()
                )));
            }
        }
        Ok(())
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(String),
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
            ConfigError::Invalid(reason) => {
                write!(f, "Invalid configuration: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
