//! Error types for signal I/O operations

use crate::registry::DeviceId;
use thiserror::Error;

/// Failure category of a [`SignalIoError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Device could not be created (bad configuration, resources exhausted)
    Construction,
    /// Fault detected while talking to hardware, recoverable through reset
    Transient,
    /// Caller misuse: unknown device, bad channel, write without acquisition
    Usage,
}

#[derive(Debug, Error)]
pub enum SignalIoError {
    #[error("Invalid device configuration: {0}")]
    InvalidConfig(String),

    #[error("Device limit reached ({0} live devices)")]
    Exhausted(usize),

    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    #[error("Unknown device {0}")]
    InvalidDevice(DeviceId),

    #[error("Invalid channel {channel} on device {device}")]
    InvalidChannel { device: DeviceId, channel: u32 },

    #[error("Output channel {channel} on device {device} is already acquired")]
    ChannelBusy { device: DeviceId, channel: u32 },

    #[error("Output channel {channel} on device {device} is not acquired")]
    ChannelNotAcquired { device: DeviceId, channel: u32 },

    #[error("Read buffer holds {got} samples, {needed} required")]
    BufferTooSmall { needed: usize, got: usize },

    #[error("Device {0} is in fault state")]
    Faulted(DeviceId),

    #[error("Hardware fault on device {device}: {reason}")]
    Hardware { device: DeviceId, reason: String },
}

impl SignalIoError {
    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SignalIoError::InvalidConfig(_)
            | SignalIoError::Exhausted(_)
            | SignalIoError::UnknownBackend(_) => ErrorKind::Construction,
            SignalIoError::Faulted(_) | SignalIoError::Hardware { .. } => ErrorKind::Transient,
            SignalIoError::InvalidDevice(_)
            | SignalIoError::InvalidChannel { .. }
            | SignalIoError::ChannelBusy { .. }
            | SignalIoError::ChannelNotAcquired { .. }
            | SignalIoError::BufferTooSmall { .. } => ErrorKind::Usage,
        }
    }

    /// Whether the error leaves the device needing a reset
    pub fn needs_reset(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }
}
