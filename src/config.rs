//! Configuration for the scheduling core.

use crate::error::{Error, Result};
use crate::scheduler::{CircuitBreaker, RemoteScheduler, ResilientScheduler};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads `path` when given, otherwise `blendsphere-srs.toml` in the
    /// working directory if present, otherwise defaults.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(url) = &self.remote.base_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!("remote.base_url must be an http(s) URL: {url}")));
            }
        }
        if self.remote.timeout_ms == 0 {
            return Err(Error::Config("remote.timeout_ms must be greater than zero".to_string()));
        }
        if self.queue.default_limit == Some(0) {
            return Err(Error::Config("queue.default_limit must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Builds the scheduler chain described by the `remote` and `breaker`
    /// sections. Without a base URL every review is scheduled locally.
    pub fn build_scheduler(&self) -> Result<ResilientScheduler> {
        let Some(base_url) = &self.remote.base_url else {
            return Ok(ResilientScheduler::local_only());
        };

        let remote = RemoteScheduler::new(
            base_url,
            self.remote.bearer_token.clone(),
            Duration::from_millis(self.remote.timeout_ms),
        )?;
        let breaker = CircuitBreaker::new(
            self.breaker.failure_threshold,
            Duration::from_secs(self.breaker.cooldown_secs),
        );
        Ok(ResilientScheduler::new(Arc::new(remote), breaker))
    }
}

pub const DEFAULT_CONFIG_FILE: &str = "blendsphere-srs.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

fn default_database_path() -> PathBuf { PathBuf::from("db.sqlite3") }

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Scoring service root, e.g. `http://localhost:8000/api/srs`.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub bearer_token: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 { 5_000 }

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            bearer_token: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the remote is skipped; 0 disables.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 { 3 }
fn default_cooldown_secs() -> u64 { 30 }

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_queue_limit")]
    pub default_limit: Option<usize>,
}

fn default_queue_limit() -> Option<usize> { Some(200) }

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_limit: default_queue_limit(),
        }
    }
}
