//! Device fault tracking
//!
//! A device starts `Normal`, moves to `Faulted` when an operation detects a hardware
//! problem, and only returns to `Normal` through an explicit reset.
//!
//! The whole state sits behind one mutex: `has_error`, `trip` and `reset` are
//! linearizable with each other. Output channel acquisition is tracked elsewhere and
//! is never touched by a reset.

use crate::registry::DeviceId;
use crate::{Result, SignalIoError};
use std::sync::{Mutex, PoisonError};

/// Observable device condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    Normal,
    Faulted,
}

/// Context recorded when a device faulted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fault {
    /// Reason given by the first trip
    pub reason: String,
    /// Number of trips since the last reset
    pub occurrences: u32,
}

#[derive(Debug)]
pub struct FaultState {
    device: DeviceId,
    fault: Mutex<Option<Fault>>,
}

impl FaultState {
    pub fn new(device: DeviceId) -> Self {
        Self {
            device,
            fault: Mutex::new(None),
        }
    }

    /// Enter the faulted state
    pub fn trip(&self, reason: impl Into<String>) {
        let mut fault = self.fault.lock().unwrap_or_else(PoisonError::into_inner);
        match fault.as_mut() {
            Some(existing) => existing.occurrences = existing.occurrences.saturating_add(1),
            None => {
                let reason = reason.into();
                tracing::warn!("Device {} faulted: {}", self.device, reason);
                *fault = Some(Fault {
                    reason,
                    occurrences: 1,
                });
            }
        }
    }

    pub fn has_error(&self) -> bool {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn status(&self) -> DeviceStatus {
        if self.has_error() {
            DeviceStatus::Faulted
        } else {
            DeviceStatus::Normal
        }
    }

    /// Snapshot of the current fault, if any
    pub fn fault(&self) -> Option<Fault> {
        self.fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Return to `Normal`, handing back the cleared fault context
    pub fn reset(&self) -> Option<Fault> {
        let cleared = self
            .fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(fault) = &cleared {
            tracing::info!(
                "Device {} reset after {} fault(s): {}",
                self.device,
                fault.occurrences,
                fault.reason
            );
        }
        cleared
    }

    /// Fail with [`SignalIoError::Faulted`] while the device is faulted
    pub fn check(&self) -> Result<()> {
        if self.has_error() {
            Err(SignalIoError::Faulted(self.device))
        } else {
            Ok(())
        }
    }
}
