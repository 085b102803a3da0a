//! Backend loading and the value-based plugin boundary
//!
//! [`BackendRegistry`] resolves a backend by name. The resulting [`Plugin`] exposes
//! the ten signal I/O operations with plain values for failures: device creation
//! returns [`DeviceId::INVALID_RAW`], checks and writes return `false`, reads return a
//! count of `0`. Nothing at this boundary panics or returns an error type.

use crate::interface::SignalIo;
use crate::loopback::LoopbackBackend;
use crate::mock::MockBackend;
use crate::params::split_backend;
use crate::registry::DeviceId;
use crate::{Result, SignalIoError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Constructor for a backend instance
pub type BackendFactory = fn() -> Arc<dyn SignalIo>;

/// A loaded backend
#[derive(Clone)]
pub struct Plugin {
    backend: Arc<dyn SignalIo>,
}

impl Plugin {
    pub fn new(backend: Arc<dyn SignalIo>) -> Self {
        Self { backend }
    }

    pub fn name(&self) -> &str {
        self.backend.name()
    }

    /// Typed access to the backend
    pub fn backend(&self) -> &Arc<dyn SignalIo> {
        &self.backend
    }

    pub fn init_device(&self, config: &str) -> i64 {
        match self.backend.init_device(config) {
            Ok(device) => device.into_raw(),
            Err(e) => {
                tracing::debug!("{}: device creation failed: {}", self.name(), e);
                DeviceId::INVALID_RAW
            }
        }
    }

    pub fn end_device(&self, device: i64) {
        if let Some(device) = DeviceId::from_raw(device) {
            self.backend.end_device(device);
        }
    }

    pub fn reset(&self, device: i64) {
        if let Some(device) = DeviceId::from_raw(device) {
            self.backend.reset(device);
        }
    }

    pub fn has_error(&self, device: i64) -> bool {
        DeviceId::from_raw(device).is_some_and(|device| self.backend.has_error(device))
    }

    pub fn get_max_input_samples_number(&self, device: i64) -> usize {
        self.call(device, |backend, device| backend.max_input_samples(device))
            .unwrap_or(0)
    }

    pub fn check_input_channel(&self, device: i64, channel: u32) -> bool {
        DeviceId::from_raw(device)
            .is_some_and(|device| self.backend.check_input_channel(device, channel))
    }

    pub fn read(&self, device: i64, channel: u32, buf: &mut [f64]) -> usize {
        self.call(device, |backend, device| backend.read(device, channel, buf))
            .unwrap_or(0)
    }

    pub fn acquire_output_channel(&self, device: i64, channel: u32) -> bool {
        self.call(device, |backend, device| {
            backend.acquire_output_channel(device, channel)
        })
        .is_some()
    }

    pub fn release_output_channel(&self, device: i64, channel: u32) {
        if let Some(device) = DeviceId::from_raw(device) {
            self.backend.release_output_channel(device, channel);
        }
    }

    pub fn write(&self, device: i64, channel: u32, value: f64) -> bool {
        self.call(device, |backend, device| backend.write(device, channel, value))
            .is_some()
    }

    fn call<T, F>(&self, device: i64, op: F) -> Option<T>
    where
        F: FnOnce(&dyn SignalIo, DeviceId) -> Result<T>,
    {
        let Some(id) = DeviceId::from_raw(device) else {
            tracing::debug!("{}: invalid device id {}", self.name(), device);
            return None;
        };
        match op(self.backend.as_ref(), id) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!("{}: {}", self.name(), e);
                None
            }
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plugin").field("name", &self.name()).finish()
    }
}

/// Name-to-backend lookup table
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry preloaded with the bundled backends
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(MockBackend::NAME, || Arc::new(MockBackend::new()));
        registry.register(LoopbackBackend::NAME, || Arc::new(LoopbackBackend::new()));
        registry
    }

    /// Add or replace a backend
    pub fn register(&mut self, name: &str, factory: BackendFactory) {
        if self
            .factories
            .insert(name.to_lowercase(), factory)
            .is_some()
        {
            tracing::warn!("Backend '{}' registered twice, keeping the latest", name);
        }
    }

    /// Registered backend names, sorted
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }

    /// Instantiate a backend by name
    pub fn load(&self, name: &str) -> Result<Plugin> {
        let factory = self
            .factories
            .get(&name.to_lowercase())
            .ok_or_else(|| SignalIoError::UnknownBackend(name.to_string()))?;
        tracing::debug!("Loading backend '{}'", name);
        Ok(Plugin::new(factory()))
    }

    /// Load the backend named by a `backend:params` string and create a device on it
    pub fn open(&self, device_config: &str) -> Result<(Plugin, i64)> {
        let (name, _) = split_backend(device_config.trim()).ok_or_else(|| {
            SignalIoError::InvalidConfig(format!("missing backend prefix in '{device_config}'"))
        })?;
        let plugin = self.load(name)?;
        let device = plugin.backend().init_device(device_config)?;
        Ok((plugin, device.into_raw()))
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}
