use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::cache::CachePolicy;

// =============================================================================
// Upstream endpoints
// =============================================================================

/// Flat JSON index of every published Electron release
pub const DEFAULT_FEED_URL: &str = "https://electronjs.org/headers/index.json";

/// Release builds currently running or queued on the release infrastructure
pub const DEFAULT_ACTIVE_BUILDS_URL: &str =
    "https://electron-sudowoodo.herokuapp.com/release/active";

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

pub const DEFAULT_OWNER: &str = "electron";
pub const DEFAULT_REPO: &str = "electron";
pub const DEFAULT_NIGHTLY_REPO: &str = "nightlies";

pub const USER_AGENT: &str = "release-tracker";

// =============================================================================
// Time-related constants
// =============================================================================

/// Timeout for a single upstream request in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: u64 = 30_000;

/// Paginated GitHub refreshes get this many request timeouts by default
pub const PAGINATED_TIMEOUT_FACTOR: u32 = 4;

/// Environment variable holding the GitHub bearer token
pub const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("GitHub token is not a valid header value")]
    InvalidToken,

    #[error("Invalid API base URL {0:?}")]
    InvalidUrl(String),

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
}

/// Where and how to reach the release feed and GitHub
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct UpstreamConfig {
    pub feed_url: String,
    pub active_builds_url: String,
    pub github_api_url: String,
    pub owner: String,
    pub repo: String,
    /// Repository that holds nightly releases
    pub nightly_repo: String,
    pub timeout_ms: u64,
    /// Never read from the config file, only from the environment
    #[serde(skip)]
    pub github_token: Option<String>,
}

impl UpstreamConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            active_builds_url: DEFAULT_ACTIVE_BUILDS_URL.to_string(),
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            repo: DEFAULT_REPO.to_string(),
            nightly_repo: DEFAULT_NIGHTLY_REPO.to_string(),
            timeout_ms: FETCH_TIMEOUT_MS,
            github_token: None,
        }
    }
}

/// Freshness policy per resource kind
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub releases: CachePolicyConfig,
    pub active_builds: CachePolicyConfig,
    pub github_releases: CachePolicyConfig,
    pub pull_requests: CachePolicyConfig,
    pub comments: CachePolicyConfig,
    pub recent_pull_requests: CachePolicyConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            releases: CachePolicyConfig::new(5 * 60, true),
            active_builds: CachePolicyConfig::new(30, true),
            github_releases: CachePolicyConfig::new(10 * 60, true),
            pull_requests: CachePolicyConfig::new(5 * 60, true),
            comments: CachePolicyConfig::new(5 * 60, true),
            recent_pull_requests: CachePolicyConfig::new(2 * 60, true),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CachePolicyConfig {
    /// How long a fetched value counts as fresh
    pub ttl_seconds: u64,
    /// Serve the previous value while a refresh is in flight instead of waiting
    pub stale_while_revalidate: bool,
    /// Upper bound on a whole refresh; unset means the kind's default
    pub refresh_timeout_ms: Option<u64>,
}

impl CachePolicyConfig {
    pub const fn new(ttl_seconds: u64, stale_while_revalidate: bool) -> Self {
        Self {
            ttl_seconds,
            stale_while_revalidate,
            refresh_timeout_ms: None,
        }
    }

    pub const fn with_refresh_timeout_ms(mut self, refresh_timeout_ms: u64) -> Self {
        self.refresh_timeout_ms = Some(refresh_timeout_ms);
        self
    }

    /// The policy a cache cell runs on, with `default_timeout` bounding the
    /// refresh unless one is configured
    pub fn policy(&self, default_timeout: Duration) -> CachePolicy {
        CachePolicy {
            ttl: Duration::from_secs(self.ttl_seconds),
            stale_while_revalidate: self.stale_while_revalidate,
            timeout: self
                .refresh_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(default_timeout),
        }
    }
}

impl Default for CachePolicyConfig {
    fn default() -> Self {
        Self::new(5 * 60, true)
    }
}

impl Config {
    /// Load from an optional JSON file, then apply the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        Ok(config.with_github_token(std::env::var(GITHUB_TOKEN_ENV).ok()))
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.upstream.github_token = token.filter(|t| !t.trim().is_empty());
        self
    }
}

/// Returns the path to the data directory for release-tracker.
/// Uses $XDG_DATA_HOME/release-tracker if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/release-tracker,
/// or ./release-tracker if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("release-tracker.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("release-tracker")
}
