//! Panel configuration using Figment.
//!
//! Configuration is assembled from, in order of increasing precedence:
//! 1. Built-in defaults
//! 2. A TOML file (default: `config/dps_panel.toml`, optional)
//! 3. Environment variables prefixed with `DPSPANEL_`
//!
//! Nested keys in environment variables use a double underscore:
//!
//! ```text
//! DPSPANEL_DEVICE__TARGET=/dev/ttyUSB0
//! DPSPANEL_POLLING__INTERVAL_MS=250
//! DPSPANEL_APPLICATION__LOG_LEVEL=debug
//! ```
//!
//! # Example
//!
//! ```no_run
//! use dps_panel::config::PanelConfig;
//!
//! let config = PanelConfig::load()?;
//! println!("Polling {} every {:?}", config.device.target, config.polling.interval());
//! # Ok::<(), dps_panel::config::ConfigError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/dps_panel.toml";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration load error: {0}")]
    LoadError(#[from] Box<figment::Error>),
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PanelConfig {
    #[serde(default)]
    pub application: ApplicationConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Which device library implementation executes commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Run the `dpsctl` program and capture its output.
    Dpsctl,
    /// In-process simulated power supply.
    Mock,
}

/// Device addressing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Serial port (e.g. "/dev/ttyUSB0") or network address of the unit
    #[serde(default = "default_target")]
    pub target: String,
    /// Serial baud rate, ignored for network targets
    #[serde(default = "default_baudrate")]
    pub baudrate: u32,
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Program invoked by the `dpsctl` backend
    #[serde(default = "default_program")]
    pub program: String,
}

/// Polling loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Interval between status queries in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Device calls slower than this are logged at warn level (0 disables)
    #[serde(default = "default_slow_call_warn_ms")]
    pub slow_call_warn_ms: u64,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn slow_call_warning(&self) -> Option<Duration> {
        (self.slow_call_warn_ms > 0).then(|| Duration::from_millis(self.slow_call_warn_ms))
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_name() -> String {
    "dps-panel".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_target() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baudrate() -> u32 {
    9600
}

fn default_backend() -> BackendKind {
    BackendKind::Dpsctl
}

fn default_program() -> String {
    "dpsctl".to_string()
}

fn default_interval_ms() -> u64 {
    400
}

fn default_slow_call_warn_ms() -> u64 {
    2000
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            baudrate: default_baudrate(),
            backend: default_backend(),
            program: default_program(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            slow_call_warn_ms: default_slow_call_warn_ms(),
        }
    }
}

// ============================================================================
// Configuration Loading and Validation
// ============================================================================

impl PanelConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] (if present) and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path. A missing file is not an error; the
    /// defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(PanelConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("DPSPANEL_").split("__"))
            .extract()
            .map_err(Box::new)?;

        config.validate()?;
        Ok(config)
    }

    /// Checks log level, target and polling interval.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.device.target.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "device.target cannot be empty".to_string(),
            ));
        }

        if self.device.backend == BackendKind::Dpsctl && self.device.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "device.program cannot be empty for the dpsctl backend".to_string(),
            ));
        }

        if self.polling.interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "polling.interval_ms must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
