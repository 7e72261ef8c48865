use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    Redis,
    Memory,
    Off,
}

impl FromStr for CacheMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "redis" => Ok(Self::Redis),
            "memory" => Ok(Self::Memory),
            "off" | "none" | "disabled" => Ok(Self::Off),
            other => bail!("unknown cache mode '{}' (expected redis, memory or off)", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub cache_mode: CacheMode,
    pub redis_url: Option<String>,
    pub cache_ttl: Duration,
    pub detail_delay: Duration,
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port: u16 = var("TODOCHAT_PORT", "8000")
            .parse()
            .context("TODOCHAT_PORT must be a port number")?;

        let redis_url = lookup("REDIS_URL").filter(|url| !url.is_empty());
        let cache_mode = match lookup("TODOCHAT_CACHE") {
            Some(mode) => mode.parse()?,
            None if redis_url.is_some() => CacheMode::Redis,
            None => CacheMode::Memory,
        };
        if cache_mode == CacheMode::Redis && redis_url.is_none() {
            bail!("TODOCHAT_CACHE=redis requires REDIS_URL");
        }

        let cache_ttl_secs: u64 = var("TODOCHAT_CACHE_TTL_SECS", "20")
            .parse()
            .context("TODOCHAT_CACHE_TTL_SECS must be a whole number of seconds")?;
        let detail_delay_ms: u64 = var("TODOCHAT_DETAIL_DELAY_MS", "5000")
            .parse()
            .context("TODOCHAT_DETAIL_DELAY_MS must be a whole number of milliseconds")?;

        let cors_origins = var("TODOCHAT_CORS_ORIGINS", "http://localhost,http://localhost:8080")
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(String::from)
            .collect();

        Ok(Self {
            host: var("TODOCHAT_HOST", "0.0.0.0"),
            port,
            db_path: var("TODOCHAT_DB_PATH", "app.db").into(),
            cache_mode,
            redis_url,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            detail_delay: Duration::from_millis(detail_delay_ms),
            cors_origins,
        })
    }
}
