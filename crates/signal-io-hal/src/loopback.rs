//! Loopback backend
//!
//! Output channel `n` is wired to input channel `n`: every read returns the latest
//! written value, repeated for the whole batch. Useful to close a control loop in
//! tests without hardware. Writing a non-finite value models a driver rejecting the
//! output stage and faults the device.

use crate::channel::OutputChannels;
use crate::fault::FaultState;
use crate::interface::SignalIo;
use crate::params::DeviceParams;
use crate::registry::{DeviceId, DeviceTable};
use crate::sampling::InputChannels;
use crate::{Result, SignalIoError};
use std::sync::{PoisonError, RwLock};

struct LoopbackDevice {
    inputs: InputChannels,
    outputs: OutputChannels,
    fault: FaultState,
    levels: RwLock<Vec<f64>>,
}

pub struct LoopbackBackend {
    devices: DeviceTable<LoopbackDevice>,
}

impl LoopbackBackend {
    pub const NAME: &'static str = "loopback";

    pub fn new() -> Self {
        Self {
            devices: DeviceTable::new(),
        }
    }

    fn parse(config: &str) -> Result<(usize, usize)> {
        let params = DeviceParams::parse(config)?;
        params.ensure_backend(Self::NAME)?;
        params.ensure_known(&["channels", "samples"])?;

        let channels: usize = params.get_or("channels", 1)?;
        let samples: usize = params.get_or("samples", 1)?;
        if channels == 0 || samples == 0 {
            return Err(SignalIoError::InvalidConfig(
                "channels and samples must be at least 1".into(),
            ));
        }
        Ok((channels, samples))
    }
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalIo for LoopbackBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init_device(&self, config: &str) -> Result<DeviceId> {
        let (channels, samples) = Self::parse(config)?;
        let id = self.devices.insert_with(|id| LoopbackDevice {
            inputs: InputChannels::new(id, channels, samples),
            outputs: OutputChannels::new(id, channels),
            fault: FaultState::new(id),
            levels: RwLock::new(vec![0.0; channels]),
        })?;
        tracing::info!("Loopback device {} created with {} channel(s)", id, channels);
        Ok(id)
    }

    fn end_device(&self, device: DeviceId) {
        if let Some(state) = self.devices.remove(device) {
            state.outputs.release_all();
            tracing::info!("Loopback device {} ended", device);
        }
    }

    fn reset(&self, device: DeviceId) {
        if let Ok(state) = self.devices.get(device) {
            state.fault.reset();
        }
    }

    fn has_error(&self, device: DeviceId) -> bool {
        self.devices
            .get(device)
            .map(|state| state.fault.has_error())
            .unwrap_or(false)
    }

    fn max_input_samples(&self, device: DeviceId) -> Result<usize> {
        Ok(self.devices.get(device)?.inputs.batch_size())
    }

    fn check_input_channel(&self, device: DeviceId, channel: u32) -> bool {
        self.devices
            .get(device)
            .map(|state| state.inputs.check(channel))
            .unwrap_or(false)
    }

    fn read(&self, device: DeviceId, channel: u32, buf: &mut [f64]) -> Result<usize> {
        let state = self.devices.get(device)?;
        if !state.inputs.check(channel) {
            return Err(SignalIoError::InvalidChannel { device, channel });
        }
        state.fault.check()?;

        let level = state.levels.read().unwrap_or_else(PoisonError::into_inner)[channel as usize];
        state.inputs.read_with(channel, buf, |_| Ok(level))
    }

    fn acquire_output_channel(&self, device: DeviceId, channel: u32) -> Result<()> {
        self.devices.get(device)?.outputs.acquire(channel)
    }

    fn release_output_channel(&self, device: DeviceId, channel: u32) {
        if let Ok(state) = self.devices.get(device) {
            let _levels = state.levels.write().unwrap_or_else(PoisonError::into_inner);
            state.outputs.release(channel);
        }
    }

    fn write(&self, device: DeviceId, channel: u32, value: f64) -> Result<()> {
        let state = self.devices.get(device)?;
        let mut levels = state.levels.write().unwrap_or_else(PoisonError::into_inner);
        state.outputs.ensure_acquired(channel)?;
        state.fault.check()?;

        if !value.is_finite() {
            let reason = format!("output stage rejected {value} on channel {channel}");
            state.fault.trip(reason.clone());
            return Err(SignalIoError::Hardware { device, reason });
        }

        levels[channel as usize] = value;
        Ok(())
    }
}
