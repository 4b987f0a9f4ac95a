//! Configuration management for Manga Finder.
//!
//! This module handles loading and parsing configuration from TOML files,
//! with sensible defaults for all settings.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `api.base_url`
pub const API_URL_ENV: &str = "MANGA_FINDER_API_URL";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory settings
    pub data: DataConfig,

    /// Logging settings
    pub logging: LoggingConfig,

    /// Jikan API settings
    pub api: ApiConfig,

    /// Query cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Genre preview loader settings
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Search settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Genre listing settings
    #[serde(default)]
    pub genre: GenreConfig,
}

/// Data directory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataConfig {
    /// Root data directory path
    pub root_dir: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log directory path (relative to data directory or absolute)
    pub log_dir: String,

    /// Default log level (trace, debug, info, warn, error)
    pub default_level: String,

    /// Enable console output
    pub console: bool,

    /// Enable file output
    pub file: bool,

    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

/// Jikan API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Jikan API base URL
    pub base_url: String,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// User agent sent with every request
    pub user_agent: String,

    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum requests per second
    pub requests_per_second: f64,

    /// Maximum requests per minute
    pub requests_per_minute: u32,
}

/// Query cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness window for search, detail and top lists
    pub default_freshness_secs: u64,

    /// Freshness window for the genre list
    pub genres_freshness_secs: u64,

    /// Retries after a failed fetch
    pub retries: u32,

    /// Fixed delay before a retry in milliseconds
    pub retry_delay_ms: u64,
}

/// Genre preview loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Delay between consecutive genre requests in milliseconds
    pub delay_ms: u64,

    /// Titles requested per genre preview
    pub preview_limit: u32,
}

/// Search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Quiet period before a typed query is submitted
    pub debounce_ms: u64,
}

/// Genre listing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenreConfig {
    /// Titles per page on genre listings
    pub page_size: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_freshness_secs: 5 * 60,
            genres_freshness_secs: 24 * 60 * 60,
            retries: 1,
            retry_delay_ms: 1000,
        }
    }
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            delay_ms: 1000,
            preview_limit: 12,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

impl Default for GenreConfig {
    fn default() -> Self {
        Self { page_size: 24 }
    }
}

impl CacheConfig {
    pub fn default_freshness(&self) -> Duration {
        Duration::from_secs(self.default_freshness_secs)
    }

    pub fn genres_freshness(&self) -> Duration {
        Duration::from_secs(self.genres_freshness_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data: DataConfig {
                root_dir: "data".to_string(),
            },
            logging: LoggingConfig {
                log_dir: "logs".to_string(),
                default_level: "info".to_string(),
                console: false,
                file: true,
                json_format: false,
            },
            api: ApiConfig {
                base_url: "https://api.jikan.moe/v4".to_string(),
                timeout_secs: 30,
                user_agent: "manga-finder/0.1.0".to_string(),
                rate_limit: RateLimitConfig {
                    requests_per_second: 2.0,
                    requests_per_minute: 50,
                },
            },
            cache: CacheConfig::default(),
            loader: LoaderConfig::default(),
            search: SearchConfig::default(),
            genre: GenreConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// If the file doesn't exist, returns the default configuration.
    /// The API base URL can be overridden with `MANGA_FINDER_API_URL`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let mut config = if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            Self::default()
        } else {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            tracing::info!(
                path = %path.display(),
                "Configuration loaded successfully"
            );
            config
        };

        config.apply_env_overrides(std::env::var(API_URL_ENV).ok());
        Ok(config)
    }

    /// Apply the base URL override, if any
    fn apply_env_overrides(&mut self, api_url: Option<String>) {
        if let Some(url) = api_url.filter(|u| !u.trim().is_empty()) {
            tracing::info!(base_url = %url, "Using API base URL from environment");
            self.api.base_url = url.trim_end_matches('/').to_string();
        }
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = toml::to_string_pretty(self)
            .context("Failed to serialize configuration")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            "Configuration saved successfully"
        );

        Ok(())
    }

    /// Get the absolute path for the data directory
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.data.root_dir)
    }

    /// Get the absolute path for the log directory
    pub fn log_dir(&self) -> PathBuf {
        let log_path = Path::new(&self.logging.log_dir);
        if log_path.is_absolute() {
            log_path.to_path_buf()
        } else {
            self.data_dir().join(log_path)
        }
    }

    /// Parse the configured log level, falling back to INFO
    pub fn log_level(&self) -> tracing::Level {
        self.logging
            .default_level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    }
}
