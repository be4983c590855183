//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/deskpulse/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/deskpulse/` (~/.config/deskpulse/)
//! - Data: `$XDG_DATA_HOME/deskpulse/` (~/.local/share/deskpulse/)
//! - State/Logs: `$XDG_STATE_HOME/deskpulse/` (~/.local/state/deskpulse/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Dataset cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Tier chain configuration
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Ticket-source CRM API configuration (optional)
    #[serde(default)]
    pub ticket_source: TicketSourceConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Dataset cache configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Seconds a resolved dataset stays valid
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Maximum number of cached datasets before the oldest are evicted
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_max_entries() -> usize {
    1000
}

/// Tier chain configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    /// Default per-tier timeout in milliseconds
    #[serde(default = "default_tier_timeout")]
    pub tier_timeout_ms: u64,

    /// Per-tier timeout overrides, keyed by tier name ("primary", "mirror", ...)
    #[serde(default)]
    pub tier_timeouts: HashMap<String, u64>,

    /// Directory of previously materialized run outputs
    pub snapshot_dir: Option<PathBuf>,

    /// Directory holding `tickets/*.csv` and `chats/*.csv` raw extracts
    pub raw_dir: Option<PathBuf>,

    /// Number of most recent snapshot runs to inspect
    #[serde(default = "default_snapshot_lookback")]
    pub snapshot_lookback: usize,

    /// Path of the batch-synced mirror database (secondary tier)
    pub mirror_path: Option<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            tier_timeout_ms: default_tier_timeout(),
            tier_timeouts: HashMap::new(),
            snapshot_dir: None,
            raw_dir: None,
            snapshot_lookback: default_snapshot_lookback(),
            mirror_path: None,
        }
    }
}

impl ResolverConfig {
    /// Snapshot directory, falling back to `$XDG_DATA_HOME/deskpulse/results`.
    pub fn snapshot_dir(&self) -> PathBuf {
        self.snapshot_dir
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("results"))
    }

    /// Raw extract directory, falling back to `$XDG_DATA_HOME/deskpulse/raw`.
    pub fn raw_dir(&self) -> PathBuf {
        self.raw_dir
            .clone()
            .unwrap_or_else(|| Config::data_dir().join("raw"))
    }
}

fn default_tier_timeout() -> u64 {
    10_000
}

fn default_snapshot_lookback() -> usize {
    5
}

/// Ticket-source CRM API configuration
///
/// When enabled, the API is used for live pipeline-name lookups during
/// normalization and as the source for `deskpulse sync`.
#[derive(Debug, Deserialize, Clone)]
pub struct TicketSourceConfig {
    /// Enable/disable the ticket-source integration
    #[serde(default)]
    pub enabled: bool,

    /// API base URL
    #[serde(default = "default_ticket_source_url")]
    pub base_url: String,

    /// Private-app access token
    pub access_token: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_ticket_source_timeout")]
    pub timeout_secs: u64,

    /// Records per search page (max 200)
    #[serde(default = "default_ticket_source_page_size")]
    pub page_size: usize,
}

impl Default for TicketSourceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_ticket_source_url(),
            access_token: None,
            timeout_secs: default_ticket_source_timeout(),
            page_size: default_ticket_source_page_size(),
        }
    }
}

impl TicketSourceConfig {
    /// Check if the ticket source is enabled and has credentials
    pub fn is_ready(&self) -> bool {
        self.enabled && self.access_token.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.access_token.is_none() {
            return Err(Error::Config(
                "ticket_source.access_token is required when ticket_source is enabled"
                    .to_string(),
            ));
        }
        if self.page_size == 0 || self.page_size > 200 {
            return Err(Error::Config(
                "ticket_source.page_size must be between 1 and 200".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_ticket_source_url() -> String {
    "https://api.hubapi.com".to_string()
}

fn default_ticket_source_timeout() -> u64 {
    10
}

fn default_ticket_source_page_size() -> usize {
    100
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.ticket_source.validate()?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/deskpulse/config.toml` (~/.config/deskpulse/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("deskpulse").join("config.toml")
    }

    /// Returns the data directory path
    ///
    /// `$XDG_DATA_HOME/deskpulse/` (~/.local/share/deskpulse/)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("deskpulse")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/deskpulse/` (~/.local/state/deskpulse/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("deskpulse")
    }

    /// Returns the document store file path
    ///
    /// `$XDG_DATA_HOME/deskpulse/store.db` (~/.local/share/deskpulse/store.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("store.db")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/deskpulse/deskpulse.log` (~/.local/state/deskpulse/deskpulse.log)
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("deskpulse.log")
    }

    /// Ensure XDG base directory environment variables are set.
    ///
    /// This is mainly for CLI binaries that want explicit, stable path behavior
    /// before invoking other components that read these env vars.
    pub fn ensure_xdg_env() {
        let home = home_dir();

        if std::env::var("XDG_DATA_HOME").is_err() {
            std::env::set_var("XDG_DATA_HOME", home.join(".local/share"));
        }

        if std::env::var("XDG_STATE_HOME").is_err() {
            std::env::set_var("XDG_STATE_HOME", home.join(".local/state"));
        }

        if std::env::var("XDG_CONFIG_HOME").is_err() {
            std::env::set_var("XDG_CONFIG_HOME", home.join(".config"));
        }
    }
}
