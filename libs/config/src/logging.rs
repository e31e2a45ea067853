//! Logging Setup
//!
//! Installs the process-wide `tracing` subscriber. `RUST_LOG` takes
//! precedence over the configured level so a single run can be turned up
//! without editing configuration files.

use crate::defaults;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::logging::LEVEL.to_string(),
            json: false,
        }
    }
}

/// Parse a level name (`trace`..`error`, case-insensitive)
pub fn parse_level(level: &str) -> Result<Level> {
    level
        .parse::<Level>()
        .map_err(|_| anyhow!("unknown log level '{}'", level))
}

/// Install the global subscriber.
///
/// Returns `Ok(false)` when a subscriber was already installed (for example
/// by a test harness); that is not treated as an error.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let level = parse_level(&config.level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_thread_names(true)
            .try_init()
            .is_ok()
    };

    Ok(installed)
}
