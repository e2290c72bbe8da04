//! # System Configuration
//!
//! Configuration is read from a YAML file (default `config.yaml`, or the
//! path in `VIGIL_CONFIG`). A missing file yields the built-in defaults;
//! a file that exists but cannot be read or parsed is an error.
//!
//! ## Environment Variables
//!
//! Applied on top of the file:
//! - `VIGIL_CONFIG` - Path of the configuration file
//! - `VIGIL_REDIS_URL` - Redis connection URL (default: redis://localhost:6379)
//! - `VIGIL_MAX_RESTARTS` - Restarts allowed per agent (default: 5)
//! - `VIGIL_HEARTBEAT_TIMEOUT_SECS` - Seconds without a heartbeat before restart (default: 60)
//! - `VIGIL_HEALTH_CHECK_INTERVAL_SECS` - Seconds between liveness checks (default: 30)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};
use tracing::info;
use vigil_agent::AgentOptions;
use vigil_agent::payload::{AUDITOR, TREASURER, WATCHTOWER};
use vigil_mesh::{AgentId, QueueConfig, RedisConfig};

/// Default configuration file name
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid environment variable '{key}': {message}")]
    InvalidEnvVar { key: String, message: String },

    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

/// Broker connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisSettings {
    pub url: String,
    pub pool_size: usize,
    pub connect_timeout_secs: u64,
}

impl Default for RedisSettings {
    fn default() -> Self {
        let defaults = RedisConfig::default();
        Self {
            url: defaults.url,
            pool_size: defaults.pool_size,
            connect_timeout_secs: defaults.connect_timeout_secs,
        }
    }
}

/// Retry policy for messages whose processing failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub max_retries: u32,
    pub retry_delay_secs: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_secs: 5,
        }
    }
}

/// Per-agent settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub enabled: bool,
    /// Seconds between heartbeats
    pub heartbeat_interval: u64,
    /// Agent-specific options handed to the agent's factory
    #[serde(flatten)]
    pub options: AgentOptions,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            heartbeat_interval: 30,
            options: AgentOptions::new(),
        }
    }
}

impl AgentSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval)
    }
}

/// Supervision thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    /// Seconds without a heartbeat before an agent is restarted
    pub heartbeat_timeout: u64,
    /// Restarts allowed before an agent is marked failed
    pub max_restarts: u32,
    /// Seconds between liveness checks
    pub health_check_interval: u64,
    /// Seconds between backend and queue-depth checks
    pub resource_check_interval: u64,
    /// Seconds to wait between stopping and re-creating an agent
    pub restart_delay: u64,
    /// Queue depth above which a warning is logged
    pub queue_size_warning: usize,
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        Self {
            heartbeat_timeout: 60,
            max_restarts: 5,
            health_check_interval: 30,
            resource_check_interval: 60,
            restart_delay: 5,
            queue_size_warning: 100,
        }
    }
}

impl MonitoringSettings {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval)
    }

    pub fn resource_check_interval(&self) -> Duration {
        Duration::from_secs(self.resource_check_interval)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay)
    }
}

/// Complete system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub redis: RedisSettings,
    pub queue: QueueSettings,
    pub agents: BTreeMap<String, AgentSettings>,
    pub monitoring: MonitoringSettings,
}

impl Default for SystemConfig {
    fn default() -> Self {
        let mut agents = BTreeMap::new();
        agents.insert(WATCHTOWER.to_string(), AgentSettings::default());
        let mut auditor = AgentSettings::default();
        auditor
            .options
            .insert("verification_threshold".into(), serde_json::json!(0.7));
        agents.insert(AUDITOR.to_string(), auditor);
        agents.insert(TREASURER.to_string(), AgentSettings::default());

        Self {
            redis: RedisSettings::default(),
            queue: QueueSettings::default(),
            agents,
            monitoring: MonitoringSettings::default(),
        }
    }
}

impl SystemConfig {
    /// Path from `VIGIL_CONFIG`, or `config.yaml`
    pub fn default_path() -> PathBuf {
        env::var("VIGIL_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load `path`, apply environment overrides and validate
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Read `path` as YAML, falling back to defaults if it does not exist
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => {
                let config =
                    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    })?;
                info!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Config file not found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Apply `VIGIL_*` overrides from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| env::var(key).ok())
    }

    /// Apply overrides using `lookup` as the environment
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("VIGIL_REDIS_URL") {
            self.redis.url = url;
        }
        if let Some(max_restarts) = parse_var(&lookup, "VIGIL_MAX_RESTARTS")? {
            self.monitoring.max_restarts = max_restarts;
        }
        if let Some(timeout) = parse_var(&lookup, "VIGIL_HEARTBEAT_TIMEOUT_SECS")? {
            self.monitoring.heartbeat_timeout = timeout;
        }
        if let Some(interval) = parse_var(&lookup, "VIGIL_HEALTH_CHECK_INTERVAL_SECS")? {
            self.monitoring.health_check_interval = interval;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.redis.url.trim().is_empty() {
            return Err(ConfigError::Validation(
                "redis.url cannot be empty".to_string(),
            ));
        }
        if self.redis.pool_size == 0 {
            return Err(ConfigError::Validation(
                "redis.pool_size must be greater than 0".to_string(),
            ));
        }

        let intervals = [
            ("monitoring.heartbeat_timeout", self.monitoring.heartbeat_timeout),
            (
                "monitoring.health_check_interval",
                self.monitoring.health_check_interval,
            ),
            (
                "monitoring.resource_check_interval",
                self.monitoring.resource_check_interval,
            ),
        ];
        for (field, value) in intervals {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "{field} must be greater than 0"
                )));
            }
        }

        for (name, agent) in &self.agents {
            AgentId::parse(name).map_err(|e| {
                ConfigError::Validation(format!("invalid agent name '{name}': {e}"))
            })?;
            if agent.heartbeat_interval == 0 {
                return Err(ConfigError::Validation(format!(
                    "agents.{name}.heartbeat_interval must be greater than 0"
                )));
            }
        }

        Ok(())
    }

    /// Names of agents with `enabled: true`
    pub fn enabled_agents(&self) -> impl Iterator<Item = (&str, &AgentSettings)> {
        self.agents
            .iter()
            .filter(|(_, settings)| settings.enabled)
            .map(|(name, settings)| (name.as_str(), settings))
    }

    pub fn redis_config(&self) -> RedisConfig {
        RedisConfig::new(self.redis.url.clone())
            .with_pool_size(self.redis.pool_size)
            .with_connect_timeout(self.redis.connect_timeout_secs)
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            max_retries: self.queue.max_retries,
            retry_delay: Duration::from_secs(self.queue.retry_delay_secs),
            ..QueueConfig::default()
        }
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => val
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidEnvVar {
                key: key.to_string(),
                message: format!("invalid value '{val}': {e}"),
            }),
        None => Ok(None),
    }
}
