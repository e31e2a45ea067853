//! # Courier Configuration
//!
//! Explicit configuration structs for every courier component, plus the
//! layered loader that builds them from TOML files and `COURIER_*`
//! environment variables.
//!
//! ## Usage
//!
//! ```rust
//! use courier_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_toml_str(r#"
//! [runner]
//! name = "overlay"
//! idle_timeout_ms = 30000
//!
//! [pump]
//! high_water_mark = 500
//! "#).unwrap();
//!
//! assert_eq!(config.runner.name.as_deref(), Some("overlay"));
//! assert_eq!(config.pump.high_water_mark, 500);
//! ```

pub mod defaults;
pub mod logging;
pub mod runtime;

pub use logging::{init_logging, LoggingConfig};
pub use runtime::{
    load_config, DirectConfig, LogGatewayConfig, PersistenceConfig, PumpConfig, RunnerConfig,
    RuntimeConfig, TimerConfig,
};
