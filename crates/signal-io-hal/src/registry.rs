//! Device identifiers and the per-backend table of live devices

use crate::{Result, SignalIoError};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// Handle to a device created by a backend
///
/// Valid identifiers are non-negative. At the plugin boundary a failed creation is
/// signalled with [`DeviceId::INVALID_RAW`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(u64);

impl DeviceId {
    /// Boundary value returned when a device could not be created
    pub const INVALID_RAW: i64 = -1;

    /// Convert a boundary integer into a handle, rejecting the sentinel
    pub fn from_raw(raw: i64) -> Option<Self> {
        u64::try_from(raw).ok().map(DeviceId)
    }

    /// Boundary integer for this handle
    pub fn into_raw(self) -> i64 {
        // Allocation stops before the counter leaves the i64 range
        self.0 as i64
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Table of live devices owned by one backend
///
/// Identifiers come from a counter that only moves forward, so an ended device's
/// identifier never refers to a newer device.
pub struct DeviceTable<D> {
    devices: RwLock<HashMap<DeviceId, Arc<D>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl<D> DeviceTable<D> {
    /// Default limit on simultaneously live devices
    pub const DEFAULT_CAPACITY: usize = 256;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            capacity,
        }
    }

    /// Store a device and hand out a fresh identifier
    pub fn insert(&self, device: D) -> Result<DeviceId> {
        self.insert_with(|_| device)
    }

    /// Store a device built from its freshly allocated identifier
    pub fn insert_with<F>(&self, build: F) -> Result<DeviceId>
    where
        F: FnOnce(DeviceId) -> D,
    {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        if devices.len() >= self.capacity {
            return Err(SignalIoError::Exhausted(devices.len()));
        }

        let raw = self.next_id.fetch_add(1, Ordering::Relaxed);
        if raw > i64::MAX as u64 {
            return Err(SignalIoError::Exhausted(devices.len()));
        }

        let id = DeviceId(raw);
        devices.insert(id, Arc::new(build(id)));
        Ok(id)
    }

    /// Look up a live device
    pub fn get(&self, id: DeviceId) -> Result<Arc<D>> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned()
            .ok_or(SignalIoError::InvalidDevice(id))
    }

    /// Remove a device, returning its state if it was live
    pub fn remove(&self, id: DeviceId) -> Option<Arc<D>> {
        self.devices
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers of all live devices, in creation order
    pub fn ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<DeviceId> = self
            .devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .copied()
            .collect();
        ids.sort();
        ids
    }
}

impl<D> Default for DeviceTable<D> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_conversion() {
        assert_eq!(DeviceId::from_raw(0).map(DeviceId::into_raw), Some(0));
        assert_eq!(DeviceId::from_raw(42).map(DeviceId::into_raw), Some(42));
        assert!(DeviceId::from_raw(-1).is_none());
        assert!(DeviceId::from_raw(i64::MIN).is_none());
    }

    #[test]
    fn test_insert_get_remove() {
        let table = DeviceTable::new();
        let a = table.insert("a").unwrap();
        let b = table.insert("b").unwrap();

        assert_ne!(a, b);
        assert_eq!(*table.get(a).unwrap(), "a");
        assert_eq!(table.len(), 2);

        assert_eq!(table.remove(a).as_deref(), Some(&"a"));
        assert!(matches!(table.get(a), Err(SignalIoError::InvalidDevice(id)) if id == a));
        assert_eq!(*table.get(b).unwrap(), "b");
    }

    #[test]
    fn test_identifiers_not_reused() {
        let table = DeviceTable::new();
        let first = table.insert(1).unwrap();
        table.remove(first);
        let second = table.insert(2).unwrap();

        assert_ne!(first, second);
        assert!(table.get(first).is_err());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let table = DeviceTable::new();
        let live = table.insert(()).unwrap();

        assert!(table.remove(DeviceId(99)).is_none());
        table.remove(live);
        assert!(table.remove(live).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_capacity_limit() {
        let table = DeviceTable::with_capacity(1);
        let id = table.insert(()).unwrap();

        assert!(matches!(table.insert(()), Err(SignalIoError::Exhausted(1))));
        assert_eq!(table.ids(), vec![id]);

        table.remove(id);
        assert!(table.insert(()).is_ok());
    }
}
