//! Mock backend for testing without real hardware
//!
//! Input channels produce a sine wave, output channels store the last written value.
//!
//! # Configuration
//!
//! `mock:key=value,...` with the keys below, all optional:
//!
//! | Key | Meaning | Default |
//! |-----|---------|---------|
//! | `channels` | input and output channel count (1-64) | 2 |
//! | `samples` | samples per read (1-4096) | 4 |
//! | `rate` | sampling rate in Hz | 1000 |
//! | `frequency` | sine frequency in Hz | 1 |
//! | `amplitude` | sine amplitude | 1 |
//! | `offset` | constant added to every sample | 0 |
//! | `noise` | uniform noise amplitude | 0 |
//! | `fault_after` | simulate a hardware fault on the N-th read | never |
//!
//! # Usage
//!
//! ```no_run
//! use signal_io_hal::{MockBackend, SignalIo};
//!
//! let backend = MockBackend::new();
//! let device = backend.init_device("mock:channels=2,samples=8").unwrap();
//!
//! let mut samples = [0.0; 8];
//! backend.read(device, 0, &mut samples).unwrap();
//!
//! // Force a fault from a test
//! backend.inject_fault(device, "cable unplugged").unwrap();
//! assert!(backend.has_error(device));
//! ```

use crate::channel::{ChannelState, OutputChannels};
use crate::fault::FaultState;
use crate::interface::SignalIo;
use crate::params::DeviceParams;
use crate::registry::{DeviceId, DeviceTable};
use crate::sampling::InputChannels;
use crate::{Result, SignalIoError};
use rand::Rng;
use std::f64::consts::PI;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

const MAX_CHANNELS: usize = 64;
const MAX_SAMPLES: usize = 4096;

/// Parsed mock device configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MockConfig {
    pub channels: usize,
    pub samples: usize,
    pub rate: f64,
    pub frequency: f64,
    pub amplitude: f64,
    pub offset: f64,
    pub noise: f64,
    pub fault_after: Option<u64>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            channels: 2,
            samples: 4,
            rate: 1000.0,
            frequency: 1.0,
            amplitude: 1.0,
            offset: 0.0,
            noise: 0.0,
            fault_after: None,
        }
    }
}

impl MockConfig {
    const KEYS: &'static [&'static str] = &[
        "channels",
        "samples",
        "rate",
        "frequency",
        "amplitude",
        "offset",
        "noise",
        "fault_after",
    ];

    pub fn parse(config: &str) -> Result<Self> {
        let params = DeviceParams::parse(config)?;
        params.ensure_backend(MockBackend::NAME)?;
        params.ensure_known(Self::KEYS)?;

        let defaults = Self::default();
        let parsed = Self {
            channels: params.get_or("channels", defaults.channels)?,
            samples: params.get_or("samples", defaults.samples)?,
            rate: params.get_or("rate", defaults.rate)?,
            frequency: params.get_or("frequency", defaults.frequency)?,
            amplitude: params.get_or("amplitude", defaults.amplitude)?,
            offset: params.get_or("offset", defaults.offset)?,
            noise: params.get_or("noise", defaults.noise)?,
            fault_after: params.get("fault_after")?,
        };
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=MAX_CHANNELS).contains(&self.channels) {
            return Err(SignalIoError::InvalidConfig(format!(
                "channels must be 1-{MAX_CHANNELS}, got {}",
                self.channels
            )));
        }
        if !(1..=MAX_SAMPLES).contains(&self.samples) {
            return Err(SignalIoError::InvalidConfig(format!(
                "samples must be 1-{MAX_SAMPLES}, got {}",
                self.samples
            )));
        }
        if !(self.rate.is_finite() && self.rate > 0.0) {
            return Err(SignalIoError::InvalidConfig(format!(
                "rate must be positive, got {}",
                self.rate
            )));
        }
        if !(self.noise.is_finite() && self.noise >= 0.0) {
            return Err(SignalIoError::InvalidConfig(format!(
                "noise must be non-negative, got {}",
                self.noise
            )));
        }
        if self.fault_after == Some(0) {
            return Err(SignalIoError::InvalidConfig(
                "fault_after must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Noise-free signal value of `channel` at sample `index`
    pub fn signal(&self, channel: u32, index: u64) -> f64 {
        let t = index as f64 / self.rate;
        let phase = f64::from(channel) * PI / 4.0;
        self.offset + self.amplitude * (2.0 * PI * self.frequency * t + phase).sin()
    }
}

struct MockDevice {
    config: MockConfig,
    inputs: InputChannels,
    outputs: OutputChannels,
    fault: FaultState,
    levels: Vec<Mutex<f64>>,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl MockDevice {
    fn new(id: DeviceId, config: MockConfig) -> Self {
        Self {
            inputs: InputChannels::new(id, config.channels, config.samples),
            outputs: OutputChannels::new(id, config.channels),
            fault: FaultState::new(id),
            levels: (0..config.channels).map(|_| Mutex::new(0.0)).collect(),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
            config,
        }
    }
}

/// Mock signal I/O backend
pub struct MockBackend {
    devices: DeviceTable<MockDevice>,
}

impl MockBackend {
    pub const NAME: &'static str = "mock";

    pub fn new() -> Self {
        Self {
            devices: DeviceTable::new(),
        }
    }

    /// Limit the number of simultaneously live devices
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            devices: DeviceTable::with_capacity(capacity),
        }
    }

    /// Simulate a hardware fault
    pub fn inject_fault(&self, device: DeviceId, reason: &str) -> Result<()> {
        self.devices.get(device)?.fault.trip(reason);
        Ok(())
    }

    /// Last value written to an output channel
    pub fn output_value(&self, device: DeviceId, channel: u32) -> Option<f64> {
        let device = self.devices.get(device).ok()?;
        let level = device.levels.get(channel as usize)?;
        Some(*level.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Number of successful writes on a device
    pub fn write_count(&self, device: DeviceId) -> Option<u64> {
        self.devices
            .get(device)
            .ok()
            .map(|d| d.writes.load(Ordering::Relaxed))
    }

    pub fn channel_state(&self, device: DeviceId, channel: u32) -> Option<ChannelState> {
        self.devices.get(device).ok()?.outputs.state(channel)
    }

    pub fn config(&self, device: DeviceId) -> Option<MockConfig> {
        self.devices.get(device).ok().map(|d| d.config.clone())
    }

    pub fn live_devices(&self) -> usize {
        self.devices.len()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalIo for MockBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn init_device(&self, config: &str) -> Result<DeviceId> {
        let config = MockConfig::parse(config)?;
        let (channels, samples) = (config.channels, config.samples);
        let id = self
            .devices
            .insert_with(|id| MockDevice::new(id, config))?;
        tracing::info!(
            "[MOCK] Device {} created: {} channels, {} samples per read",
            id,
            channels,
            samples
        );
        Ok(id)
    }

    fn end_device(&self, device: DeviceId) {
        if let Some(state) = self.devices.remove(device) {
            let released = state.outputs.release_all();
            tracing::info!(
                "[MOCK] Device {} ended, {} output channel(s) released",
                device,
                released
            );
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
        // Usage errors must not consume a simulated fault
        state.inputs.validate(channel, buf.len())?;
        state.fault.check()?;

        let read_number = state.reads.fetch_add(1, Ordering::Relaxed) + 1;
        if state.config.fault_after == Some(read_number) {
            let reason = format!("simulated acquisition overrun on read {read_number}");
            state.fault.trip(reason.clone());
            return Err(SignalIoError::Hardware { device, reason });
        }

        let config = &state.config;
        let mut rng = rand::thread_rng();
        state.inputs.read_with(channel, buf, |index| {
            let mut value = config.signal(channel, index);
            if config.noise > 0.0 {
                value += rng.gen_range(-config.noise..=config.noise);
            }
            Ok(value)
        })
    }

    fn acquire_output_channel(&self, device: DeviceId, channel: u32) -> Result<()> {
        self.devices.get(device)?.outputs.acquire(channel)
    }

    fn release_output_channel(&self, device: DeviceId, channel: u32) {
        if let Ok(state) = self.devices.get(device) {
            // Wait for an in-flight write on this channel to finish
            let _level = state
                .levels
                .get(channel as usize)
                .map(|level| level.lock().unwrap_or_else(PoisonError::into_inner));
            state.outputs.release(channel);
        }
    }

    fn write(&self, device: DeviceId, channel: u32, value: f64) -> Result<()> {
        let state = self.devices.get(device)?;
        let level = state
            .levels
            .get(channel as usize)
            .ok_or(SignalIoError::InvalidChannel { device, channel })?;

        // Held across the acquisition check so a concurrent release cannot slip in
        let mut level = level.lock().unwrap_or_else(PoisonError::into_inner);
        state.outputs.ensure_acquired(channel)?;
        state.fault.check()?;

        *level = value;
        state.writes.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("[MOCK] Device {} channel {} <- {}", device, channel, value);
        Ok(())
    }
}
