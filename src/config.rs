//! Configuration System
//!
//! Handles loading configuration from TOML files with environment variable
//! overrides. The `[[metric]]` array declares the derived metrics; each
//! entry is parsed into a descriptor at load time and invalid entries are
//! skipped with a warning rather than aborting startup.

use crate::descriptor::ParamMap;
use crate::query::DialectKind;
use crate::store::SeriesId;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub engine: EngineSection,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Declared metrics, one `[[metric]]` block each.
    #[serde(default, rename = "metric")]
    pub metrics: Vec<MetricDef>,
}

/// Store access configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    #[serde(default = "default_store_path")]
    pub path: String,

    #[serde(default)]
    pub dialect: DialectKind,

    /// How long to wait for the connection lock before giving up (seconds).
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,

    /// Minimum gap between reconnect attempts after a failure (seconds).
    #[serde(default = "default_reconnect_cooldown")]
    pub reconnect_cooldown_secs: u64,
}

fn default_store_path() -> String {
    dirs::data_local_dir()
        .map(|p| p.join("tally").join("log.db").to_string_lossy().to_string())
        .unwrap_or_else(|| "./log.db".to_string())
}

fn default_lock_timeout() -> u64 {
    300
}

fn default_reconnect_cooldown() -> u64 {
    20
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            dialect: DialectKind::default(),
            lock_timeout_secs: default_lock_timeout(),
            reconnect_cooldown_secs: default_reconnect_cooldown(),
        }
    }
}

/// Engine scheduling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSection {
    /// How often the engine checks for due work (seconds).
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// Start with the dispatch queue suspended.
    #[serde(default)]
    pub start_suspended: bool,
}

fn default_cycle_interval() -> u64 {
    60
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            cycle_interval_secs: default_cycle_interval(),
            start_suspended: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
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
            file: None,
        }
    }
}

/// One declared metric, as written in the config file.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricDef {
    /// Unique name; also the key results are published under.
    pub name: String,

    /// The source series in the log table.
    pub series: SeriesId,

    /// Symbolic function name, e.g. `day_max` or `rolling_12m_year_minus1`.
    pub function: String,

    /// Extra parameters for named functions (`year`, `month`, ...).
    #[serde(default)]
    pub params: ParamMap,

    /// Optional value to exclude from aggregation windows.
    pub ignore_value: Option<f64>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
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
            dirs::config_dir().map(|p| p.join("tally").join("config.toml")),
            Some(PathBuf::from("/etc/tally/config.toml")),
            Some(PathBuf::from("./config.toml")),
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

        tracing::info!("Using default config with environment overrides");
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("TALLY_STORE_PATH") {
            self.store.path = path;
        }
        if let Ok(dialect) = std::env::var("TALLY_STORE_DIALECT") {
            match dialect.as_str() {
                "rich" => self.store.dialect = DialectKind::Rich,
                "reduced" => self.store.dialect = DialectKind::Reduced,
                other => tracing::warn!("Unknown TALLY_STORE_DIALECT {:?}, ignoring", other),
            }
        }
        if let Ok(level) = std::env::var("TALLY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TALLY_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreSection::default(),
            engine: EngineSection::default(),
            logging: LoggingConfig::default(),
            metrics: Vec::new(),
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
    r#"# Tally Configuration
#
# Environment variables override these settings:
# - TALLY_STORE_PATH
# - TALLY_STORE_DIALECT
# - TALLY_LOG_LEVEL
# - TALLY_LOG_FORMAT

[store]
# Path to the log database file
path = "~/.local/share/tally/log.db"

# SQL dialect: "rich" (date arithmetic in SQL) or "reduced"
dialect = "reduced"

# How long to wait for the connection lock (seconds)
lock_timeout_secs = 300

# Minimum gap between reconnect attempts (seconds)
reconnect_cooldown_secs = 20

[engine]
# How often the engine checks for due work (seconds)
cycle_interval_secs = 60

# Start with the dispatch queue suspended
start_suspended = false

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/tally/tally.log"

# Derived metrics, one block each
#
# [[metric]]
# name = "kitchen_temp_day_max"
# series = 12
# function = "day_max"
#
# [[metric]]
# name = "heating_gts_2023"
# series = 12
# function = "grassland_temp_sum"
# params = { year = 2023 }
"#
    .to_string()
}
