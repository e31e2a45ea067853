//! Runtime Configuration Module
//!
//! Provides configuration loading for runners, gateways, and persistence.
//! Supports loading from TOML files with `COURIER_*` environment overrides:
//!
//! ```text
//! COURIER_RUNNER__IDLE_TIMEOUT_MS=500   ->  runner.idle_timeout_ms = 500
//! COURIER_PUMP__CAPACITY=2048           ->  pump.capacity = 2048
//! ```

use crate::defaults;
use crate::logging::LoggingConfig;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "COURIER";

/// Top-level configuration for a courier process
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub logging: LoggingConfig,
    pub runner: RunnerConfig,
    pub pump: PumpConfig,
    pub timer: TimerConfig,
    pub direct: DirectConfig,
    pub log_gateway: LogGatewayConfig,
    pub persistence: PersistenceConfig,
}

/// Runner (scheduler) settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Pump thread name; defaults to `runner-<prefix>`
    pub name: Option<String>,

    /// Evict checkpointed actors idle for this long (requires a persister)
    pub idle_timeout_ms: Option<u64>,

    /// Maximum bus items handled per pump iteration
    pub max_batch: usize,

    /// Cap on messages held for one evicted actor; overflow is dropped
    pub max_held: usize,

    /// Held messages are dropped if the actor is not resumed in time
    pub held_timeout_ms: u64,
}

/// Buffering layer in front of slow shuttles
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PumpConfig {
    pub capacity: usize,
    pub high_water_mark: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct TimerConfig {
    pub worker_threads: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct DirectConfig {
    pub read_timeout_ms: u64,
}

/// Diagnostic sink settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LogGatewayConfig {
    /// One of `trace`, `debug`, `info`, `warn`, `error`
    pub level: String,
}

/// Retry policy applied around store backends
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct PersistenceConfig {
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            name: None,
            idle_timeout_ms: None,
            max_batch: defaults::runner::MAX_BATCH,
            max_held: defaults::runner::MAX_HELD,
            held_timeout_ms: defaults::runner::HELD_TIMEOUT_MS,
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            capacity: defaults::pump::CAPACITY,
            high_water_mark: defaults::pump::HIGH_WATER_MARK,
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            worker_threads: defaults::timer::WORKER_THREADS,
        }
    }
}

impl Default for DirectConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: defaults::direct::READ_TIMEOUT_MS,
        }
    }
}

impl Default for LogGatewayConfig {
    fn default() -> Self {
        Self {
            level: defaults::logging::LEVEL.to_string(),
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::persistence::MAX_ATTEMPTS,
            retry_backoff_ms: defaults::persistence::RETRY_BACKOFF_MS,
        }
    }
}

impl RunnerConfig {
    /// Config with an explicit thread name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn held_timeout(&self) -> Duration {
        Duration::from_millis(self.held_timeout_ms)
    }
}

impl DirectConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl PersistenceConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

impl RuntimeConfig {
    /// Load configuration from an optional TOML file with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            debug!("Loading courier config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: RuntimeConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Parse inline TOML (no environment layering)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RuntimeConfig =
            toml::from_str(content).context("Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no component can run with
    pub fn validate(&self) -> Result<()> {
        if self.runner.max_batch == 0 {
            bail!("runner.max_batch must be greater than zero");
        }
        if self.runner.held_timeout_ms == 0 {
            bail!("runner.held_timeout_ms must be greater than zero");
        }
        if self.runner.idle_timeout_ms == Some(0) {
            bail!("runner.idle_timeout_ms must be greater than zero when set");
        }
        if self.pump.capacity == 0 {
            bail!("pump.capacity must be greater than zero");
        }
        if self.pump.high_water_mark == 0 || self.pump.high_water_mark > self.pump.capacity {
            bail!(
                "pump.high_water_mark must be in 1..={} (got {})",
                self.pump.capacity,
                self.pump.high_water_mark
            );
        }
        if self.timer.worker_threads == 0 {
            bail!("timer.worker_threads must be greater than zero");
        }
        if self.persistence.max_attempts == 0 {
            bail!("persistence.max_attempts must be greater than zero");
        }
        crate::logging::parse_level(&self.log_gateway.level)
            .with_context(|| format!("log_gateway.level '{}'", self.log_gateway.level))?;
        crate::logging::parse_level(&self.logging.level)
            .with_context(|| format!("logging.level '{}'", self.logging.level))?;
        Ok(())
    }
}

/// Convenience function to load configuration with defaults
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    RuntimeConfig::load(path)
}
