//! The signal I/O capability set every backend provides

use crate::Result;
use crate::registry::DeviceId;

/// Signal acquisition/generation backend
///
/// A backend owns any number of independent devices. Operations on different devices
/// never affect each other, and every method may be called from several threads at once.
///
/// Usage violations (unknown device, invalid channel, writing without acquisition) are
/// reported as errors and never move a device into the faulted state. Hardware problems
/// detected during an operation fault the device until [`SignalIo::reset`].
pub trait SignalIo: Send + Sync {
    /// Backend name used for lookup in a [`crate::BackendRegistry`]
    fn name(&self) -> &str;

    /// Create a device from a backend-specific configuration string
    ///
    /// Nothing stays allocated when creation fails.
    fn init_device(&self, config: &str) -> Result<DeviceId>;

    /// Discard a device, forcibly releasing its output channels
    ///
    /// Unknown or already ended identifiers are ignored.
    fn end_device(&self, device: DeviceId);

    /// Clear the fault state and any buffered error context
    fn reset(&self, device: DeviceId);

    /// Whether the device is faulted; `false` for unknown devices
    fn has_error(&self, device: DeviceId) -> bool;

    /// Samples produced per input channel on every [`SignalIo::read`]
    fn max_input_samples(&self, device: DeviceId) -> Result<usize>;

    /// Whether `channel` is a readable input channel
    fn check_input_channel(&self, device: DeviceId, channel: u32) -> bool;

    /// Read one batch of samples into `buf`, most recent last
    ///
    /// `buf` must hold at least [`SignalIo::max_input_samples`] values.
    fn read(&self, device: DeviceId, channel: u32, buf: &mut [f64]) -> Result<usize>;

    /// Take exclusive write access to an output channel
    fn acquire_output_channel(&self, device: DeviceId, channel: u32) -> Result<()>;

    /// Give up write access; redundant releases are ignored
    fn release_output_channel(&self, device: DeviceId, channel: u32);

    /// Write one value to an acquired output channel
    fn write(&self, device: DeviceId, channel: u32, value: f64) -> Result<()>;
}
