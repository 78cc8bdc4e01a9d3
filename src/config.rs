//! Configuration module for the bench-proto node.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::protocols::ProtocolSettings;

/// Command-line arguments for the node
#[derive(Parser, Debug)]
#[command(name = "bench-proto")]
#[command(author = "bench-proto authors")]
#[command(version = "0.1.0")]
#[command(about = "Serves the hello and bench-data stream protocols", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to listen on (repeatable, e.g. -l 0.0.0.0:41605 -l [::]:41605)
    #[arg(short = 'l', long)]
    pub listen: Vec<String>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Maximum number of streams served at once
    #[arg(long)]
    pub max_streams: Option<u32>,

    /// Seconds to wait for in-flight streams on shutdown (0 = abandon them)
    #[arg(long)]
    pub shutdown_grace: Option<u64>,

    /// Largest encoded request accepted, in bytes
    #[arg(long)]
    pub max_request_size: Option<usize>,

    /// Size of each generated payload chunk, in bytes (multiple of 8)
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// Per-read/per-write stream deadline in seconds (disabled when unset)
    #[arg(long)]
    pub stream_timeout: Option<u64>,

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
    pub protocol: ProtocolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Addresses to listen on
    #[serde(default = "default_listen")]
    pub listen: Vec<String>,
    /// Number of worker threads
    pub workers: Option<usize>,
    /// Maximum number of streams served at once
    #[serde(default = "default_max_streams")]
    pub max_streams: u32,
    /// Shutdown drain period in seconds
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
            max_streams: default_max_streams(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

/// Protocol handler configuration
#[derive(Debug, Deserialize)]
pub struct ProtocolConfig {
    /// Largest encoded request accepted, in bytes
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
    /// Payload chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Per-operation stream deadline in seconds
    pub stream_timeout: Option<u64>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_request_size: default_max_request_size(),
            chunk_size: default_chunk_size(),
            stream_timeout: None,
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

fn default_listen() -> Vec<String> {
    vec!["0.0.0.0:41605".to_string()]
}

fn default_max_streams() -> u32 {
    10_000
}

fn default_shutdown_grace() -> u64 {
    5
}

fn default_max_request_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_chunk_size() -> usize {
    64 * 1024 // 64 KB
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: Vec<String>,
    pub workers: usize,
    pub max_streams: u32,
    pub shutdown_grace: Duration,
    pub max_request_size: usize,
    pub chunk_size: usize,
    pub stream_timeout: Option<Duration>,
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

        Self::resolve(cli, toml_config)
    }

    /// Merge CLI args over TOML values and validate the result.
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let listen = if cli.listen.is_empty() {
            toml_config.server.listen
        } else {
            cli.listen
        };

        let workers = match cli.workers.or(toml_config.server.workers) {
            None | Some(0) => num_cpus(),
            Some(n) => n,
        };

        let config = Config {
            listen,
            workers,
            max_streams: cli.max_streams.unwrap_or(toml_config.server.max_streams),
            shutdown_grace: Duration::from_secs(
                cli.shutdown_grace
                    .unwrap_or(toml_config.server.shutdown_grace),
            ),
            max_request_size: cli
                .max_request_size
                .unwrap_or(toml_config.protocol.max_request_size),
            chunk_size: cli.chunk_size.unwrap_or(toml_config.protocol.chunk_size),
            stream_timeout: cli
                .stream_timeout
                .or(toml_config.protocol.stream_timeout)
                .map(Duration::from_secs),
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.is_empty() {
            return Err(ConfigError::Invalid("at least one listen address is required"));
        }
        if self.max_streams == 0 {
            return Err(ConfigError::Invalid("max_streams must be greater than zero"));
        }
        if self.max_request_size == 0 {
            return Err(ConfigError::Invalid(
                "max_request_size must be greater than zero",
            ));
        }
        // Chunk boundaries must fall on whole generator words.
        if self.chunk_size == 0 || self.chunk_size % 8 != 0 {
            return Err(ConfigError::Invalid(
                "chunk_size must be a non-zero multiple of 8",
            ));
        }
        Ok(())
    }

    /// Settings shared read-only by every stream handler.
    pub fn protocol_settings(&self) -> ProtocolSettings {
        ProtocolSettings {
            max_request_size: self.max_request_size,
            chunk_size: self.chunk_size,
            stream_timeout: self.stream_timeout,
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    Invalid(&'static str),
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
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
