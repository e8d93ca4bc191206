//! Configuration management for the PyPI MCP Server
//!
//! Handles paths, environment variables, and upstream endpoints.

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::EvictionStrategy;
use crate::error::{ConfigError, PypiMcpError, Result};

/// Configuration for the PyPI MCP Server
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory for the on-disk cache tier
    pub cache_dir: PathBuf,

    /// Default time-to-live for cached responses
    pub cache_ttl: Duration,

    /// Maximum size of the disk cache in bytes
    pub cache_max_size: u64,

    /// Maximum number of entries kept in memory
    pub memory_cache_size: usize,

    /// Memory eviction strategy
    pub eviction_strategy: EvictionStrategy,

    /// Whether the disk tier is enabled
    pub disk_cache: bool,

    /// User-Agent sent with every request
    pub user_agent: String,

    /// Per-request timeout
    pub timeout: Duration,

    /// Attempts per request for retriable failures
    pub max_retries: u32,

    /// Initial retry backoff
    pub retry_delay: Duration,

    /// Minimum interval between two outgoing requests
    pub min_request_interval: Duration,

    /// PyPI base URL (JSON API, RSS feeds, search)
    pub pypi_url: String,

    /// Package file host
    pub files_url: String,

    /// pypistats.org base URL
    pub stats_url: String,

    /// OSV API base URL
    pub osv_url: String,
}

impl Config {
    /// Create a new configuration from the process environment
    pub fn new() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse_u64 = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let cache_dir = lookup("PYPI_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_cache_dir);

        let eviction_strategy = match lookup("PYPI_EVICTION_STRATEGY") {
            Some(name) => name.parse()?,
            None => EvictionStrategy::Lru,
        };

        let disk_cache = lookup("PYPI_DISK_CACHE")
            .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off"))
            .unwrap_or(true);

        Ok(Self {
            cache_dir,
            cache_ttl: Duration::from_secs(parse_u64("PYPI_CACHE_TTL").unwrap_or(defaults::CACHE_TTL_SECS)),
            cache_max_size: parse_u64("PYPI_CACHE_MAX_SIZE").unwrap_or(defaults::CACHE_MAX_SIZE),
            memory_cache_size: parse_u64("PYPI_MEMORY_CACHE_SIZE")
                .map(|v| v as usize)
                .unwrap_or(defaults::MEMORY_CACHE_SIZE),
            eviction_strategy,
            disk_cache,
            user_agent: lookup("PYPI_USER_AGENT").unwrap_or_else(defaults::user_agent),
            timeout: Duration::from_secs(parse_u64("PYPI_TIMEOUT").unwrap_or(defaults::TIMEOUT_SECS)),
            max_retries: parse_u64("PYPI_MAX_RETRIES")
                .map(|v| v.max(1) as u32)
                .unwrap_or(defaults::MAX_RETRIES),
            retry_delay: Duration::from_millis(
                parse_u64("PYPI_RETRY_DELAY").unwrap_or(defaults::RETRY_DELAY_MS),
            ),
            min_request_interval: Duration::from_millis(
                parse_u64("PYPI_RATE_LIMIT_MS").unwrap_or(defaults::MIN_REQUEST_INTERVAL_MS),
            ),
            pypi_url: trim_url(lookup("PYPI_BASE_URL").unwrap_or_else(|| endpoints::PYPI.to_string())),
            files_url: trim_url(lookup("PYPI_FILES_URL").unwrap_or_else(|| endpoints::FILES.to_string())),
            stats_url: trim_url(lookup("PYPI_STATS_URL").unwrap_or_else(|| endpoints::PYPISTATS.to_string())),
            osv_url: trim_url(lookup("OSV_API_URL").unwrap_or_else(|| endpoints::OSV.to_string())),
        })
    }

    /// Default cache directory: the user cache dir, else the system temp dir
    fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .map(|dir| dir.join("pypi-mcp"))
            .unwrap_or_else(|| std::env::temp_dir().join("pypi_mcp_cache"))
    }

    /// Create the cache directory if the disk tier is enabled
    pub fn ensure_cache_dir(&self) -> Result<()> {
        if self.disk_cache && !self.cache_dir.exists() {
            std::fs::create_dir_all(&self.cache_dir).map_err(|_| {
                PypiMcpError::Config(ConfigError::DirCreationFailed {
                    path: self.cache_dir.display().to_string(),
                })
            })?;
        }
        Ok(())
    }

    /// Point every upstream endpoint at one base URL (mock servers, mirrors)
    pub fn with_base_url(mut self, base: &str) -> Self {
        let base = trim_url(base.to_string());
        self.pypi_url = base.clone();
        self.files_url = base.clone();
        self.stats_url = base.clone();
        self.osv_url = base;
        self
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

/// Default tuning values
pub mod defaults {
    pub const CACHE_TTL_SECS: u64 = 3600;
    pub const CACHE_MAX_SIZE: u64 = 100 * 1024 * 1024;
    pub const MEMORY_CACHE_SIZE: usize = 1024;
    pub const TIMEOUT_SECS: u64 = 10;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_DELAY_MS: u64 = 1000;
    pub const MIN_REQUEST_INTERVAL_MS: u64 = 100;

    pub fn user_agent() -> String {
        format!("pypi-mcp-server/{}", env!("CARGO_PKG_VERSION"))
    }
}

/// Upstream endpoints
pub mod endpoints {
    /// PyPI JSON API, RSS feeds and search page
    pub const PYPI: &str = "https://pypi.org";

    /// Package file host
    pub const FILES: &str = "https://files.pythonhosted.org";

    /// Download statistics
    pub const PYPISTATS: &str = "https://pypistats.org";

    /// Open Source Vulnerabilities database
    pub const OSV: &str = "https://api.osv.dev";

    /// OSV ecosystem name for Python packages
    pub const OSV_ECOSYSTEM: &str = "PyPI";
}
