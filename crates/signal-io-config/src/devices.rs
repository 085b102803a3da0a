//! Devices a host opens at startup

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// One device to open through a backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// Host-side label used in logs
    pub name: String,
    /// Backend name, resolved through the backend registry
    pub backend: String,
    /// Backend-specific configuration string passed to device creation
    #[serde(default)]
    pub config: String,
    /// Values written once the output channels are acquired
    #[serde(default)]
    pub writes: Vec<OutputWrite>,
}

/// Value written to an output channel on every control cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutputWrite {
    pub channel: u32,
    pub value: f64,
}

impl DeviceEntry {
    /// Default mock device
    pub fn mock() -> Self {
        Self {
            name: "mock0".to_string(),
            backend: "mock".to_string(),
            config: "mock:channels=2".to_string(),
            writes: vec![],
        }
    }

    /// Build an entry from a `backend:params` string
    pub fn from_device_string(name: &str, device: &str) -> Result<Self, ConfigError> {
        let (backend, _) = device
            .split_once(':')
            .filter(|(backend, _)| !backend.trim().is_empty() && !backend.contains('='))
            .ok_or_else(|| {
                ConfigError::Invalid(format!("'{device}' does not start with a backend name"))
            })?;

        Ok(Self {
            name: name.to_string(),
            backend: backend.trim().to_string(),
            config: device.to_string(),
            writes: vec![],
        })
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("device name must not be empty".into()));
        }
        if self.backend.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "device '{}' has no backend",
                self.name
            )));
        }
        if let Some(write) = self.writes.iter().find(|w| !w.value.is_finite()) {
            return Err(ConfigError::Invalid(format!(
                "device '{}' writes a non-finite value to channel {}",
                self.name, write.channel
            )));
        }
        Ok(())
    }
}
