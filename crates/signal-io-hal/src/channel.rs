//! Output channel exclusivity
//!
//! Writing to an output channel requires holding it. Acquisition is a single
//! compare-and-swap per channel, so two concurrent attempts never both succeed.

use crate::registry::DeviceId;
use crate::{Result, SignalIoError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Acquisition state of one output channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Free,
    Acquired,
}

/// Access table for the output channels of one device
#[derive(Debug)]
pub struct OutputChannels {
    device: DeviceId,
    acquired: Vec<AtomicBool>,
}

impl OutputChannels {
    pub fn new(device: DeviceId, count: usize) -> Self {
        Self {
            device,
            acquired: (0..count).map(|_| AtomicBool::new(false)).collect(),
        }
    }

    pub fn count(&self) -> usize {
        self.acquired.len()
    }

    /// Take exclusive access to a free channel
    pub fn acquire(&self, channel: u32) -> Result<()> {
        let slot = self.slot(channel)?;
        slot.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|_| SignalIoError::ChannelBusy {
                device: self.device,
                channel,
            })
    }

    /// Give up access; releasing a free or unknown channel does nothing
    pub fn release(&self, channel: u32) {
        if let Ok(slot) = self.slot(channel) {
            slot.store(false, Ordering::Release);
        }
    }

    /// Current state, `None` for an out-of-range channel
    pub fn state(&self, channel: u32) -> Option<ChannelState> {
        self.slot(channel).ok().map(|slot| {
            if slot.load(Ordering::Acquire) {
                ChannelState::Acquired
            } else {
                ChannelState::Free
            }
        })
    }

    /// Fail unless the channel is currently held
    pub fn ensure_acquired(&self, channel: u32) -> Result<()> {
        match self.state(channel) {
            Some(ChannelState::Acquired) => Ok(()),
            Some(ChannelState::Free) => Err(SignalIoError::ChannelNotAcquired {
                device: self.device,
                channel,
            }),
            None => Err(SignalIoError::InvalidChannel {
                device: self.device,
                channel,
            }),
        }
    }

    /// Force every channel free, returning how many were held
    pub fn release_all(&self) -> usize {
        self.acquired
            .iter()
            .filter(|slot| slot.swap(false, Ordering::AcqRel))
            .count()
    }

    fn slot(&self, channel: u32) -> Result<&AtomicBool> {
        self.acquired
            .get(channel as usize)
            .ok_or(SignalIoError::InvalidChannel {
                device: self.device,
                channel,
            })
    }
}
