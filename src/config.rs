use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::Deserialize;
use thiserror::Error;

// =============================================================================
// Time-related constants
// =============================================================================

/// Default staleness window for cached versions in seconds (6 hours)
pub const DEFAULT_STALE_TIME_SECS: u64 = 6 * 60 * 60;

/// Default staleness window for aggregated stats in seconds (6 hours)
pub const DEFAULT_STATS_STALE_TIME_SECS: u64 = 6 * 60 * 60;

/// Timeout for a single forge request in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 30_000;

// =============================================================================
// Forge defaults
// =============================================================================

/// Maximum number of simultaneous outbound forge requests
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 100;

pub const DEFAULT_RELEASE_URL: &str = "https://api.github.com/repos/{owner}/{repo}/releases/latest";
pub const DEFAULT_TAGS_URL: &str = "https://api.github.com/repos/{owner}/{repo}/tags";
pub const DEFAULT_METADATA_URL: &str =
    "https://raw.githubusercontent.com/{owner}/{repo}/master/.et";

const USER_AGENT: &str = concat!("etelemetry-server/", env!("CARGO_PKG_VERSION"));

// =============================================================================
// Environment variables
// =============================================================================

pub const APP_CONFIG_ENV: &str = "ETELEMETRY_APP_CONFIG";
pub const CACHE_DIR_ENV: &str = "ETELEMETRY_CACHE";
pub const DATABASE_ENV: &str = "ETELEMETRY_DB";
pub const LOG_DIR_ENV: &str = "ETELEMETRY_LOG_DIR";
pub const STALE_TIME_ENV: &str = "ETELEMETRY_STALE_TIME";
pub const STATS_STALE_TIME_ENV: &str = "ETELEMETRY_STATS_STALE_TIME";
pub const CONCURRENCY_ENV: &str = "ETELEMETRY_CONCURRENCY";
pub const RELEASE_URL_ENV: &str = "ETELEMETRY_RELEASE_URL";
pub const TAGS_URL_ENV: &str = "ETELEMETRY_TAGS_URL";
pub const METADATA_URL_ENV: &str = "ETELEMETRY_METADATA_URL";

const DATABASE_FILE_NAME: &str = "requests.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
}

/// Server configuration structure
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Directory holding one JSON record per project
    pub cache_dir: PathBuf,
    /// Request log database; defaults to a file inside `cache_dir`
    pub database_path: Option<PathBuf>,
    /// Directory for rolling JSON log files; logs go to stderr when unset
    pub log_dir: Option<PathBuf>,
    pub cache: CacheConfig,
    pub forge: ForgeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: cache_dir_with_home(dirs::home_dir()),
            database_path: None,
            log_dir: None,
            cache: CacheConfig::default(),
            forge: ForgeConfig::default(),
        }
    }
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Seconds after which a cached version must be revalidated
    pub stale_time: u64,
    /// Seconds after which aggregated stats are recomputed
    pub stats_stale_time: u64,
    /// Bucket aggregation starts from when a project has no stats yet
    pub stats_epoch: StatsEpoch,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME_SECS,
            stats_stale_time: DEFAULT_STATS_STALE_TIME_SECS,
            stats_epoch: StatsEpoch::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StatsEpoch {
    pub year: i32,
    pub week: u32,
}

impl Default for StatsEpoch {
    fn default() -> Self {
        Self {
            year: 2019,
            week: 0,
        }
    }
}

/// Forge endpoint configuration
///
/// URLs are templates; `{owner}` and `{repo}` are substituted per request.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ForgeConfig {
    pub release_url: String,
    pub tags_url: String,
    pub metadata_url: String,
    pub timeout_ms: u64,
    pub concurrency_limit: usize,
    pub user_agent: String,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            release_url: DEFAULT_RELEASE_URL.to_string(),
            tags_url: DEFAULT_TAGS_URL.to_string(),
            metadata_url: DEFAULT_METADATA_URL.to_string(),
            timeout_ms: FETCH_TIMEOUT_MS,
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Loads configuration from the process environment.
    ///
    /// Defaults are overlaid by the JSON file named in `ETELEMETRY_APP_CONFIG`
    /// (if any), then by the individual `ETELEMETRY_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|name| std::env::var(name).ok())
    }

    fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match env(APP_CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(&env)?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(dir) = env(CACHE_DIR_ENV) {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Some(path) = env(DATABASE_ENV) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = env(LOG_DIR_ENV) {
            self.log_dir = Some(PathBuf::from(dir));
        }
        if let Some(value) = env(STALE_TIME_ENV) {
            self.cache.stale_time = parse_env(STALE_TIME_ENV, value)?;
        }
        if let Some(value) = env(STATS_STALE_TIME_ENV) {
            self.cache.stats_stale_time = parse_env(STATS_STALE_TIME_ENV, value)?;
        }
        if let Some(value) = env(CONCURRENCY_ENV) {
            self.forge.concurrency_limit = parse_env(CONCURRENCY_ENV, value)?;
        }
        if let Some(url) = env(RELEASE_URL_ENV) {
            self.forge.release_url = url;
        }
        if let Some(url) = env(TAGS_URL_ENV) {
            self.forge.tags_url = url;
        }
        if let Some(url) = env(METADATA_URL_ENV) {
            self.forge.metadata_url = url;
        }
        Ok(())
    }

    /// Returns the path to the request log database.
    pub fn database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| self.cache_dir.join(DATABASE_FILE_NAME))
    }
}

impl CacheConfig {
    pub fn stale_window(&self) -> TimeDelta {
        seconds(self.stale_time)
    }

    pub fn stats_stale_window(&self) -> TimeDelta {
        seconds(self.stats_stale_time)
    }
}

fn parse_env<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}

fn seconds(secs: u64) -> TimeDelta {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .unwrap_or(TimeDelta::MAX)
}

/// Returns the default cache directory, `~/.etcache`,
/// or `./.etcache` if no home directory is available.
fn cache_dir_with_home(home_dir: Option<PathBuf>) -> PathBuf {
    home_dir
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".etcache")
}
