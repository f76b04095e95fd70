use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::pool::PoolError;

pub mod duration_serde;

/// How the age of an idle connection is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutType {
    /// Expire connections that sat idle longer than the idle timeout
    #[default]
    Idle,
    /// Expire connections older than the idle timeout, like a life cycle
    Fixed,
}

impl std::str::FromStr for TimeoutType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "idle" => Ok(TimeoutType::Idle),
            "fixed" => Ok(TimeoutType::Fixed),
            other => anyhow::bail!("Unknown timeout type '{}' (expected idle or fixed)", other),
        }
    }
}

/// Connection pool configuration
///
/// Durations are written as whole seconds in config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Initial backend addresses
    #[serde(default)]
    pub init_targets: Vec<String>,

    /// Connections dialed when the pool is created
    #[serde(default = "default_init_cap")]
    pub init_cap: usize,

    /// Maximum number of idle connections kept by the pool
    #[serde(default = "default_max_cap")]
    pub max_cap: usize,

    /// Eviction policy
    #[serde(default)]
    pub timeout_type: TimeoutType,

    /// Dial timeout
    #[serde(default = "default_dial_timeout", with = "duration_serde")]
    pub dial_timeout: Duration,

    /// Idle or lifetime timeout depending on `timeout_type` (0 disables expiry)
    #[serde(default = "default_idle_timeout", with = "duration_serde")]
    pub idle_timeout: Duration,

    /// Read timeout, passed through to the connector
    #[serde(default = "default_io_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// Write timeout, passed through to the connector
    #[serde(default = "default_io_timeout", with = "duration_serde")]
    pub write_timeout: Duration,
}

fn default_init_cap() -> usize {
    5
}

fn default_max_cap() -> usize {
    100
}

fn default_dial_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_io_timeout() -> Duration {
    Duration::from_secs(5)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            init_targets: Vec::new(),
            init_cap: default_init_cap(),
            max_cap: default_max_cap(),
            timeout_type: TimeoutType::default(),
            dial_timeout: default_dial_timeout(),
            idle_timeout: default_idle_timeout(),
            read_timeout: default_io_timeout(),
            write_timeout: default_io_timeout(),
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default settings for the given targets
    pub fn new<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            init_targets: targets.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Check the configuration before a pool is built from it
    ///
    /// An unknown timeout type cannot reach this point: it is rejected when
    /// the config is parsed.
    pub fn validate(&self) -> Result<(), PoolError> {
        let reason = if self.init_targets.is_empty() {
            "init_targets must not be empty"
        } else if self.init_cap == 0 {
            "init_cap must be greater than 0"
        } else if self.max_cap == 0 {
            "max_cap must be greater than 0"
        } else if self.init_cap > self.max_cap {
            "init_cap must not exceed max_cap"
        } else if self.dial_timeout.is_zero() {
            "dial_timeout must be greater than 0"
        } else if self.read_timeout.is_zero() {
            "read_timeout must be greater than 0"
        } else if self.write_timeout.is_zero() {
            "write_timeout must be greater than 0"
        } else {
            return Ok(());
        };

        Err(PoolError::InvalidConfig(reason.to_string()))
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<PoolConfig> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: PoolConfig =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// - POOL_TARGETS (comma-separated list of addresses, required)
/// - POOL_INIT_CAP / POOL_MAX_CAP
/// - POOL_TIMEOUT_TYPE (idle or fixed)
/// - POOL_DIAL_TIMEOUT / POOL_IDLE_TIMEOUT / POOL_READ_TIMEOUT / POOL_WRITE_TIMEOUT (seconds)
pub fn load_from_env() -> Result<PoolConfig> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let targets_str =
        std::env::var("POOL_TARGETS").context("POOL_TARGETS environment variable not set")?;

    let targets: Vec<String> = targets_str
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if targets.is_empty() {
        anyhow::bail!("POOL_TARGETS contains no valid addresses");
    }

    let mut config = PoolConfig::new(targets);

    if let Some(val) = env_parse("POOL_INIT_CAP")? {
        config.init_cap = val;
    }
    if let Some(val) = env_parse("POOL_MAX_CAP")? {
        config.max_cap = val;
    }
    if let Some(val) = env_parse("POOL_TIMEOUT_TYPE")? {
        config.timeout_type = val;
    }
    if let Some(secs) = env_parse("POOL_DIAL_TIMEOUT")? {
        config.dial_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = env_parse("POOL_IDLE_TIMEOUT")? {
        config.idle_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = env_parse("POOL_READ_TIMEOUT")? {
        config.read_timeout = Duration::from_secs(secs);
    }
    if let Some(secs) = env_parse("POOL_WRITE_TIMEOUT")? {
        config.write_timeout = Duration::from_secs(secs);
    }

    Ok(config)
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", key, e)),
        Err(_) => Ok(None),
    }
}

/// Load configuration from file or environment
///
/// Reads the YAML file when a path is given, otherwise falls back to
/// environment variables.
pub fn load_config(config_path: Option<&str>) -> Result<PoolConfig> {
    match config_path {
        Some(path) => load_from_yaml(path),
        None => load_from_env(),
    }
}
