//! Logging and control loop settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset
    #[serde(default = "default_level")]
    pub level: String,
    /// Colored output
    #[serde(default)]
    pub ansi: bool,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            ansi: false,
        }
    }
}

/// Pacing of the host control loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// Read/write iterations per device
    #[serde(default = "default_cycles")]
    pub cycles: u32,
    /// Pause between iterations
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,
    /// Upper bound on any single blocking device call
    #[serde(default = "default_watchdog_ms")]
    pub watchdog_ms: u64,
    /// Reset devices automatically when they report a fault
    #[serde(default = "default_true")]
    pub auto_reset: bool,
}

fn default_cycles() -> u32 {
    10
}

fn default_period_ms() -> u64 {
    20
}

fn default_watchdog_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            cycles: default_cycles(),
            period_ms: default_period_ms(),
            watchdog_ms: default_watchdog_ms(),
            auto_reset: true,
        }
    }
}

impl ControlConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn watchdog(&self) -> Duration {
        Duration::from_millis(self.watchdog_ms)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.watchdog_ms == 0 {
            return Err(ConfigError::Invalid("watchdog_ms must be positive".into()));
        }
        Ok(())
    }
}
