//! Configuration for the jsonrpc-reactor server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::transport::{Framing, TcpOptions};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the server
#[derive(Parser, Debug, Default)]
#[command(name = "jsonrpc-reactor")]
#[command(version)]
#[command(about = "A JSON-RPC 2.0 server over TCP or UDP", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:8086)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Transport to serve on
    #[arg(short = 't', long, value_enum)]
    pub transport: Option<TransportKind>,

    /// Message framing on the wire
    #[arg(short = 'f', long, value_enum)]
    pub framing: Option<Framing>,

    /// Poll timeout in milliseconds (0 = non-blocking poll, negative = block indefinitely)
    #[arg(long, allow_negative_numbers = true)]
    pub poll_timeout_ms: Option<i64>,

    /// Maximum number of concurrent TCP clients
    #[arg(long)]
    pub max_connections: Option<usize>,

    /// Size of each socket read in bytes
    #[arg(long)]
    pub recv_buffer_size: Option<usize>,

    /// Largest message accepted on a TCP connection in bytes
    #[arg(long)]
    pub max_message_size: Option<usize>,

    /// Unsent response bytes per TCP client before its reads pause
    #[arg(long)]
    pub max_outbox_size: Option<usize>,

    /// TCP listen backlog
    #[arg(long)]
    pub backlog: Option<i32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Which transport the server runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Tcp,
    Udp,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub transport: TransportKind,
    /// Defaults per transport when unset
    pub framing: Option<Framing>,
    /// Poll timeout in milliseconds; negative blocks indefinitely
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: i64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_backlog")]
    pub backlog: i32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            transport: TransportKind::default(),
            framing: None,
            poll_timeout_ms: default_poll_timeout_ms(),
            max_connections: default_max_connections(),
            backlog: default_backlog(),
        }
    }
}

/// Buffer and message size limits
#[derive(Debug, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_recv_buffer_size")]
    pub recv_buffer_size: usize,
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "default_max_outbox_size")]
    pub max_outbox_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: default_recv_buffer_size(),
            max_message_size: default_max_message_size(),
            max_outbox_size: default_max_outbox_size(),
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

fn default_listen() -> String {
    "127.0.0.1:8086".to_string()
}

fn default_poll_timeout_ms() -> i64 {
    1000
}

fn default_max_connections() -> usize {
    1024
}

fn default_backlog() -> i32 {
    128
}

fn default_recv_buffer_size() -> usize {
    16 * 1024 // 16 KB
}

fn default_max_message_size() -> usize {
    1024 * 1024 // 1 MB
}

fn default_max_outbox_size() -> usize {
    4 * 1024 * 1024 // 4 MB
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub transport: TransportKind,
    pub framing: Framing,
    pub poll_timeout: Option<Duration>,
    pub max_connections: usize,
    pub recv_buffer_size: usize,
    pub max_message_size: usize,
    pub max_outbox_size: usize,
    pub backlog: i32,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve parsed CLI args, reading the TOML file they point at.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge CLI args over TOML values (CLI takes precedence).
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let transport = cli.transport.unwrap_or(toml_config.server.transport);
        let framing = cli
            .framing
            .or(toml_config.server.framing)
            .unwrap_or(match transport {
                TransportKind::Tcp => Framing::Netstring,
                TransportKind::Udp => Framing::None,
            });

        let config = Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            transport,
            framing,
            poll_timeout: poll_timeout(
                cli.poll_timeout_ms
                    .unwrap_or(toml_config.server.poll_timeout_ms),
            ),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            recv_buffer_size: cli
                .recv_buffer_size
                .unwrap_or(toml_config.limits.recv_buffer_size),
            max_message_size: cli
                .max_message_size
                .unwrap_or(toml_config.limits.max_message_size),
            max_outbox_size: cli
                .max_outbox_size
                .unwrap_or(toml_config.limits.max_outbox_size),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "max_connections must be greater than 0".to_string(),
            ));
        }
        if self.recv_buffer_size == 0 {
            return Err(ConfigError::InvalidValue(
                "recv_buffer_size must be greater than 0".to_string(),
            ));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_message_size must be greater than 0".to_string(),
            ));
        }
        if self.max_outbox_size == 0 {
            return Err(ConfigError::InvalidValue(
                "max_outbox_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Options for the TCP reactor.
    pub fn tcp_options(&self) -> TcpOptions {
        TcpOptions {
            framing: self.framing,
            max_connections: self.max_connections,
            recv_buffer_size: self.recv_buffer_size,
            max_message_size: self.max_message_size,
            max_outbox_size: self.max_outbox_size,
            backlog: self.backlog,
        }
    }
}

/// Negative timeouts block indefinitely.
fn poll_timeout(ms: i64) -> Option<Duration> {
    u64::try_from(ms).ok().map(Duration::from_millis)
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidValue(String),
}
