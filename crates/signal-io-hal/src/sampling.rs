//! Input sampling
//!
//! Every input channel of a device produces the same number of samples per read.
//! Each channel keeps a running sample index behind its own lock, so reads of one
//! channel are serialized while other channels proceed.

use crate::registry::DeviceId;
use crate::{Result, SignalIoError};
use std::sync::{Mutex, PoisonError};

#[derive(Debug)]
pub struct InputChannels {
    device: DeviceId,
    batch_size: usize,
    cursors: Vec<Mutex<u64>>,
}

impl InputChannels {
    pub fn new(device: DeviceId, count: usize, batch_size: usize) -> Self {
        Self {
            device,
            batch_size,
            cursors: (0..count).map(|_| Mutex::new(0)).collect(),
        }
    }

    /// Samples produced per channel on each read
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn count(&self) -> usize {
        self.cursors.len()
    }

    /// Whether `channel` can be read
    pub fn check(&self, channel: u32) -> bool {
        (channel as usize) < self.cursors.len()
    }

    /// Validate a read request without producing any samples
    pub fn validate(&self, channel: u32, buf_len: usize) -> Result<()> {
        if !self.check(channel) {
            return Err(SignalIoError::InvalidChannel {
                device: self.device,
                channel,
            });
        }
        if buf_len < self.batch_size {
            return Err(SignalIoError::BufferTooSmall {
                needed: self.batch_size,
                got: buf_len,
            });
        }
        Ok(())
    }

    /// Fill one batch, oldest sample first
    ///
    /// `sample` receives the running index of each produced sample on this channel and
    /// may fail; samples already written to `buf` are then left in place but the read
    /// reports an error.
    pub fn read_with<F>(&self, channel: u32, buf: &mut [f64], mut sample: F) -> Result<usize>
    where
        F: FnMut(u64) -> Result<f64>,
    {
        self.validate(channel, buf.len())?;
        let cursor = &self.cursors[channel as usize];

        let mut index = cursor.lock().unwrap_or_else(PoisonError::into_inner);
        for slot in &mut buf[..self.batch_size] {
            *slot = sample(*index)?;
            *index += 1;
        }

        Ok(self.batch_size)
    }

    /// Rewind every channel's sample index
    pub fn rewind(&self) {
        for cursor in &self.cursors {
            *cursor.lock().unwrap_or_else(PoisonError::into_inner) = 0;
        }
    }
}
