//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::ApiClientConfig;
use crate::realtime::{BusConfig, ConnectionConfig, ReconnectPolicy};
use crate::session::FileStore;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub realtime: RealtimeConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the QuickPoll server lives
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Push endpoint; derived from `api_url` when absent
    pub ws_url: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_page_size() -> u32 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: None,
            request_timeout_secs: default_request_timeout(),
            page_size: default_page_size(),
        }
    }
}

impl ServerConfig {
    /// Configured push endpoint, or `api_url` with a ws scheme and `/ws`
    pub fn ws_url(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }

        let base = self.api_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/ws", base)
    }

    pub fn api_client(&self) -> ApiClientConfig {
        ApiClientConfig {
            base_url: self.api_url.clone(),
            request_timeout_secs: self.request_timeout_secs,
        }
    }
}

/// Live update connection
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    #[serde(default = "default_realtime_enabled")]
    pub enabled: bool,

    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Stop retrying after this many consecutive failures (unset = never)
    pub max_attempts: Option<u32>,

    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_realtime_enabled() -> bool {
    true
}

fn default_reconnect_delay() -> u64 {
    3000 // 3 seconds
}

fn default_backoff_factor() -> f64 {
    1.0
}

fn default_max_delay() -> u64 {
    30_000
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_channel_capacity() -> usize {
    256
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: default_realtime_enabled(),
            reconnect_delay_ms: default_reconnect_delay(),
            max_attempts: None,
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay(),
            connect_timeout_secs: default_connect_timeout(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl RealtimeConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            delay: Duration::from_millis(self.reconnect_delay_ms),
            max_attempts: self.max_attempts,
            backoff_factor: self.backoff_factor,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn bus(&self) -> BusConfig {
        BusConfig {
            channel_capacity: self.channel_capacity,
        }
    }
}

/// Durable credential storage
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    /// Defaults to the platform data directory
    pub store_path: Option<String>,
}

impl SessionConfig {
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(FileStore::default_path)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&content).map_err(|error| ConfigError::Parse {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("quickpoll").join("config.toml")),
            Some(PathBuf::from("./quickpoll.toml")),
        ];

        for path in config_paths.iter().flatten() {
            if path.exists() {
                match Self::load_with_env(path) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path, e);
                    }
                }
            }
        }

        tracing::debug!("Using default config with environment overrides");
        Self::from_env()
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.server.ws_url(),
            reconnect: self.realtime.reconnect_policy(),
            connect_timeout: Duration::from_secs(self.realtime.connect_timeout_secs),
        }
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply `QUICKPOLL_*` overrides from any variable source
    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Server overrides
        if let Some(url) = var("QUICKPOLL_API_URL") {
            self.server.api_url = url;
        }
        if let Some(url) = var("QUICKPOLL_WS_URL") {
            self.server.ws_url = Some(url);
        }

        // Session overrides
        if let Some(path) = var("QUICKPOLL_SESSION_PATH") {
            self.session.store_path = Some(path);
        }

        // Logging overrides
        if let Some(level) = var("QUICKPOLL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("QUICKPOLL_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# QuickPoll Configuration
#
# Environment variables override these settings:
# - QUICKPOLL_API_URL
# - QUICKPOLL_WS_URL
# - QUICKPOLL_SESSION_PATH
# - QUICKPOLL_LOG_LEVEL
# - QUICKPOLL_LOG_FORMAT

[server]
# QuickPoll API server
api_url = "http://localhost:8000"

# Live update endpoint (default: api_url with ws scheme and /ws path)
# ws_url = "ws://localhost:8000/ws"

# Request timeout in seconds
request_timeout_secs = 30

# Polls per page
page_size = 10

[realtime]
# Keep a live connection for push updates
enabled = true

# Delay before reconnecting after the connection drops (ms)
reconnect_delay_ms = 3000

# Give up after this many consecutive failures (default: retry forever)
# max_attempts = 10

# Delay growth per failure (1.0 = fixed delay)
backoff_factor = 1.0

# Upper bound for a grown delay (ms)
max_delay_ms = 30000

# Timeout for a single connection attempt (seconds)
connect_timeout_secs = 10

# Events buffered per subscriber
channel_capacity = 256

[session]
# Where the sign-in credential is kept
# store_path = "~/.local/share/quickpoll/session.json"

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}
