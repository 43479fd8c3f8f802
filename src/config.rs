use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use schedkit::{ExecuteOptions, RetryConfig};

/// Get the config directory path (~/.config/rigup)
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("rigup"))
}

/// Default cache store location (~/.cache/rigup/installs)
pub fn default_cache_dir() -> Result<PathBuf> {
    let base = dirs::cache_dir().context("Could not determine cache directory")?;
    Ok(base.join("rigup").join("installs"))
}

/// User configuration, loaded from ~/.config/rigup/config.toml.
///
/// Every field has a default so a missing file or a partial file works.
#[derive(Debug, Serialize, Deserialize)]
pub struct RigupConfig {
    /// Worker pool size within a wave
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,

    /// Override for the cache store directory (supports ~)
    #[serde(default)]
    pub cache_dir: Option<String>,

    /// TTL for new cache entries, in hours
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: u64,

    /// Entry cap before oldest-first eviction
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    /// Attempts per unit for transient failures (including the first)
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,

    /// Base backoff delay between retries, in seconds
    #[serde(default = "default_retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,
}

fn default_max_parallel() -> usize {
    4
}

fn default_cache_ttl_hours() -> u64 {
    24
}

fn default_cache_max_entries() -> usize {
    512
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_secs() -> u64 {
    5
}

impl Default for RigupConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            cache_dir: None,
            cache_ttl_hours: default_cache_ttl_hours(),
            cache_max_entries: default_cache_max_entries(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_secs: default_retry_base_delay_secs(),
        }
    }
}

impl RigupConfig {
    fn config_file() -> Result<PathBuf> {
        Ok(config_dir()?.join("config.toml"))
    }

    /// Load config from disk, or return defaults if the file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = Self::config_file()?;

        if !path.exists() {
            log::debug!("config file does not exist, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: RigupConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Resolved cache store directory.
    pub fn cache_path(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => {
                let expanded = shellexpand::tilde(dir);
                Ok(PathBuf::from(expanded.as_ref()))
            }
            None => default_cache_dir(),
        }
    }

    /// Build scheduler options from config plus CLI overrides.
    pub fn execute_options(
        &self,
        max_parallel: Option<usize>,
        fail_fast: bool,
        no_cache: bool,
        cache_ttl_hours: Option<u64>,
    ) -> ExecuteOptions {
        ExecuteOptions {
            concurrency_limit: max_parallel.unwrap_or(self.max_parallel).max(1),
            fail_fast,
            use_cache: !no_cache,
            cache_ttl: Duration::from_secs(
                cache_ttl_hours.unwrap_or(self.cache_ttl_hours) * 3600,
            ),
            retry: RetryConfig::new(
                self.retry_attempts.max(1),
                Duration::from_secs(self.retry_base_delay_secs),
                2.0,
            ),
        }
    }
}
