//! Configuration management for signal I/O hosts
//!
//! A host process (such as the probe) reads one TOML file describing how to log,
//! how to pace its control loop and which devices to open.
//!
//! ```toml
//! [logging]
//! level = "debug"
//!
//! [control]
//! cycles = 100
//! period_ms = 10
//! watchdog_ms = 500
//!
//! [[devices]]
//! name = "arm"
//! backend = "mock"
//! config = "mock:channels=4,samples=8"
//!
//! [[devices.writes]]
//! channel = 1
//! value = 2.5
//! ```

mod control;
mod devices;

pub use control::{ControlConfig, LoggingConfig};
pub use devices::{DeviceEntry, OutputWrite};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// System-wide configuration directory
pub const CONFIG_DIR: &str = "/etc/signal-io";

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV: &str = "SIGNAL_IO_CONFIG";

/// Main host configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalIoConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub control: ControlConfig,

    #[serde(default = "default_devices")]
    pub devices: Vec<DeviceEntry>,
}

fn default_devices() -> Vec<DeviceEntry> {
    vec![DeviceEntry::mock()]
}

impl Default for SignalIoConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            control: ControlConfig::default(),
            devices: default_devices(),
        }
    }
}

impl SignalIoConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration from default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        // Explicit file first, then system config
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Self::load(Path::new(&path));
        }

        let system_config = Path::new(CONFIG_DIR).join("config.toml");
        if system_config.exists() {
            return Self::load(&system_config);
        }

        tracing::warn!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, contents)?;
        tracing::info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.control.validate()?;

        let mut names = HashSet::new();
        for device in &self.devices {
            device.validate()?;
            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate device name '{}'",
                    device.name
                )));
            }
        }
        Ok(())
    }

    pub fn device(&self, name: &str) -> Option<&DeviceEntry> {
        self.devices.iter().find(|d| d.name == name)
    }
}
