use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Deserialize;
use thiserror::Error;

use crate::eras::EraTable;

// =============================================================================
// Registry constants
// =============================================================================

/// Default base URL for npm registry
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Keyword every extension package carries
pub const EXTENSION_KEYWORD: &str = "jupyterlab-extension";

/// Search results per page (registry maximum)
pub const SEARCH_PAGE_SIZE: usize = 250;

// =============================================================================
// Profiling constants
// =============================================================================

/// Maximum number of extensions classified concurrently for one date
pub const DEFAULT_CONCURRENCY: usize = 32;

/// Days between two backfill samples
pub const DEFAULT_SAMPLE_RATE_DAYS: u32 = 7;

/// Release date of JupyterLab 0.31.0
pub const DEFAULT_BACKFILL_START: &str = "2018-01-11";

/// Environment variable enabling verbose diagnostics
pub const DEBUG_ENV_VAR: &str = "EXTENSION_PROFILER_DEBUG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
}

/// Profiler configuration structure
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ProfilerConfig {
    pub registry: RegistryConfig,
    pub cache: CacheConfig,
    pub backfill: BackfillConfig,
    /// Maximum number of extensions classified concurrently
    pub concurrency: usize,
    /// Directory snapshots are written to
    pub output_dir: PathBuf,
    /// Canaries and known eras
    pub compatibility: EraTable,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            cache: CacheConfig::default(),
            backfill: BackfillConfig::default(),
            concurrency: DEFAULT_CONCURRENCY,
            output_dir: PathBuf::from("./profile"),
            compatibility: EraTable::default(),
        }
    }
}

impl ProfilerConfig {
    /// Load configuration from a JSON file, or defaults when no file is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Registry-related configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistryConfig {
    pub url: String,
    pub keyword: String,
    pub page_size: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_REGISTRY_URL.to_string(),
            keyword: EXTENSION_KEYWORD.to_string(),
            page_size: SEARCH_PAGE_SIZE,
        }
    }
}

impl RegistryConfig {
    /// Search text selecting every extension package
    pub fn search_text(&self) -> String {
        format!("keywords:\"{}\"", self.keyword)
    }
}

/// Persistence backend for the metadata and publish-time caches
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// One JSON document per cache
    #[default]
    Json,
    /// Both caches in one SQLite database
    Sqlite,
}

/// Cache-related configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Cache directory, defaults to the data directory
    pub dir: Option<PathBuf>,
}

impl CacheConfig {
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(data_dir)
    }
}

/// Backfill sampling configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct BackfillConfig {
    /// First sampled date (YYYY-MM-DD)
    pub start: String,
    pub sample_rate_days: u32,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            start: DEFAULT_BACKFILL_START.to_string(),
            sample_rate_days: DEFAULT_SAMPLE_RATE_DAYS,
        }
    }
}

impl BackfillConfig {
    pub fn start_date(&self) -> Result<NaiveDate, ConfigError> {
        parse_date(&self.start)
    }
}

pub fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| ConfigError::InvalidDate(value.to_string()))
}

/// Whether verbose diagnostics were requested by flag or environment
pub fn verbose_requested(flag: bool) -> bool {
    verbose_requested_with_env(flag, std::env::var(DEBUG_ENV_VAR).ok())
}

fn verbose_requested_with_env(flag: bool, env_value: Option<String>) -> bool {
    flag || env_value.is_some_and(|v| !matches!(v.trim(), "" | "0" | "false"))
}

/// Returns the path to the data directory for extension-profiler.
/// Uses $XDG_DATA_HOME/extension-profiler if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/extension-profiler,
/// or ./extension-profiler if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the metadata cache document.
pub fn metadata_cache_path(dir: &Path) -> PathBuf {
    dir.join("metadata-cache.json")
}

/// Returns the path to the publish-time cache document.
pub fn publish_times_cache_path(dir: &Path) -> PathBuf {
    dir.join("publish-times-cache.json")
}

/// Returns the path to the SQLite cache database.
pub fn db_path(dir: &Path) -> PathBuf {
    dir.join("cache.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("extension-profiler.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("extension-profiler")
}
