//! Signal Input/Output Hardware Abstraction Layer
//!
//! Physical and virtual signal acquisition/generation devices exposed through one
//! ten-operation contract, so a control loop can read input channels and write output
//! channels without knowing which hardware sits behind them.
//!
//! # Building blocks
//!
//! - [`DeviceTable`]: per-backend table of live devices keyed by [`DeviceId`]
//! - [`OutputChannels`]: exclusive acquisition of output channels
//! - [`InputChannels`]: fixed-size read batches per input channel
//! - [`FaultState`]: `Normal`/`Faulted` state machine cleared by reset
//!
//! Backends implement [`SignalIo`]. [`BackendRegistry`] resolves them by name and hands
//! out [`Plugin`] wrappers that keep the sentinel/boolean failure convention.
//!
//! # Example
//!
//! ```no_run
//! use signal_io_hal::BackendRegistry;
//!
//! fn main() -> anyhow::Result<()> {
//!     let registry = BackendRegistry::with_builtins();
//!     let (plugin, device) = registry.open("mock:channels=2")?;
//!
//!     let mut samples = vec![0.0; plugin.get_max_input_samples_number(device)];
//!     let count = plugin.read(device, 0, &mut samples);
//!     println!("Read {count} samples: {:?}", &samples[..count]);
//!
//!     if plugin.acquire_output_channel(device, 1) {
//!         plugin.write(device, 1, 2.5);
//!         plugin.release_output_channel(device, 1);
//!     }
//!     plugin.end_device(device);
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod error;
pub mod fault;
pub mod interface;
pub mod loopback;
pub mod mock;
pub mod params;
pub mod plugin;
pub mod registry;
pub mod sampling;

pub use channel::{ChannelState, OutputChannels};
pub use error::{ErrorKind, SignalIoError};
pub use fault::{DeviceStatus, Fault, FaultState};
pub use interface::SignalIo;
pub use loopback::LoopbackBackend;
pub use mock::{MockBackend, MockConfig};
pub use params::DeviceParams;
pub use plugin::{BackendFactory, BackendRegistry, Plugin};
pub use registry::{DeviceId, DeviceTable};
pub use sampling::InputChannels;

/// HAL Result type
pub type Result<T> = std::result::Result<T, SignalIoError>;
