//! Device Slot - one pseudo device's memory and attributes
//!
//! A slot owns a zero-initialized buffer whose size, permission mask and
//! serial number are fixed at creation. Slots are shared as
//! `Arc<DeviceSlot>`: the registry holds the owning reference, sessions hold
//! a `Weak`, and each read/write upgrades it only for the duration of one
//! call.
//!
//! Teardown flips the `live` flag before anything is released, so dispatch
//! that starts afterwards sees the device as gone while calls already in
//! flight finish against memory that is still resident.

use std::sync::atomic::{AtomicBool, Ordering};

use pcd_chardev::DevNum;
use spin::{Mutex, MutexGuard};

use crate::error::{PcdError, Result};
use crate::perm::Permission;

/// Owned, zero-filled device memory
pub struct DeviceBuffer(Box<[u8]>);

impl DeviceBuffer {
    /// Allocate `size` zeroed bytes
    ///
    /// # Errors
    /// Returns `AllocationFailed` if the allocator cannot satisfy the request
    pub fn zeroed(size: usize) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| PcdError::AllocationFailed { size })?;
        data.resize(size, 0);
        Ok(Self(data.into_boxed_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        log::debug!("device buffer of {} bytes released", self.0.len());
    }
}

/// A single pseudo device instance
pub struct DeviceSlot {
    devnum: DevNum,
    perm: Permission,
    serial: String,
    capacity: usize,
    buffer: Mutex<DeviceBuffer>,
    live: AtomicBool,
}

impl DeviceSlot {
    pub fn new(devnum: DevNum, buffer: DeviceBuffer, perm: Permission, serial: &str) -> Self {
        debug_assert!(!buffer.is_empty(), "device capacity must be positive");
        Self {
            devnum,
            perm,
            serial: serial.to_string(),
            capacity: buffer.len(),
            buffer: Mutex::new(buffer),
            live: AtomicBool::new(true),
        }
    }

    pub fn devnum(&self) -> DevNum {
        self.devnum
    }

    /// Buffer size; bounds every offset on this device
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn perm(&self) -> Permission {
        self.perm
    }

    /// Serial number, for diagnostics
    pub fn serial(&self) -> &str {
        &self.serial
    }

    /// Is the slot still reachable for new dispatch?
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    /// Stop new dispatch to this slot
    pub(crate) fn mark_removed(&self) {
        self.live.store(false, Ordering::Release);
    }

    /// Lock the buffer for one read or write span
    pub(crate) fn lock_buffer(&self) -> MutexGuard<'_, DeviceBuffer> {
        self.buffer.lock()
    }

    /// Copy of the current buffer contents
    pub fn snapshot(&self) -> Vec<u8> {
        self.buffer.lock().0.to_vec()
    }
}

impl core::ops::Deref for DeviceBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl core::ops::DerefMut for DeviceBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

impl core::fmt::Debug for DeviceSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceSlot")
            .field("devnum", &self.devnum)
            .field("capacity", &self.capacity)
            .field("perm", &self.perm)
            .field("serial", &self.serial)
            .field("live", &self.is_live())
            .finish()
    }
}
