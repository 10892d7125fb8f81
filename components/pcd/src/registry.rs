//! Device Registry - handle to slot mapping
//!
//! The registry covers a fixed window of device numbers `base .. base+max`
//! and stores at most one slot per ordinal. Lookup is an index into a
//! vector under a read lock and only clones an `Arc`.
//!
//! # Entry States
//! - `Vacant`: nothing there, lookups fail
//! - `Reserved`: claimed by a probe in progress, still invisible to lookups
//! - `Live`: dispatch-reachable
//!
//! A [`Reservation`] returns its ordinal to `Vacant` when dropped without
//! being committed, so an aborted probe never leaves a claimed handle
//! behind.

use std::sync::Arc;

use pcd_chardev::DevNum;
use spin::RwLock;

use crate::error::{PcdError, Result};
use crate::slot::DeviceSlot;

enum Entry {
    Vacant,
    Reserved,
    Live(Arc<DeviceSlot>),
}

/// Indexed collection of live device slots
pub struct DeviceRegistry {
    base: DevNum,
    entries: RwLock<Vec<Entry>>,
}

impl DeviceRegistry {
    /// Create a registry for `max_devices` handles starting at `base`
    pub fn new(base: DevNum, max_devices: u32) -> Self {
        let entries = (0..max_devices).map(|_| Entry::Vacant).collect();
        Self {
            base,
            entries: RwLock::new(entries),
        }
    }

    /// First handle of the window
    pub fn base(&self) -> DevNum {
        self.base
    }

    pub fn max_devices(&self) -> u32 {
        self.entries.read().len() as u32
    }

    fn ordinal_of(&self, devnum: DevNum, len: usize) -> Option<usize> {
        let ordinal = devnum.ordinal_from(self.base)? as usize;
        (ordinal < len).then_some(ordinal)
    }

    /// Store a new slot under the lowest free handle
    ///
    /// `build` receives the chosen handle and constructs the slot.
    ///
    /// # Errors
    /// Returns `Exhausted` if every handle is taken, or whatever `build`
    /// fails with (the handle stays free)
    pub fn insert<F>(&self, build: F) -> Result<DevNum>
    where
        F: FnOnce(DevNum) -> Result<DeviceSlot>,
    {
        let mut entries = self.entries.write();
        let max = entries.len() as u32;
        let ordinal = entries
            .iter()
            .position(|e| matches!(e, Entry::Vacant))
            .ok_or(PcdError::Exhausted { max })?;

        let devnum = self.base + ordinal as u32;
        let slot = build(devnum)?;
        entries[ordinal] = Entry::Live(Arc::new(slot));
        log::debug!("registry: {} inserted", devnum);
        Ok(devnum)
    }

    /// Claim the handle at `ordinal` for a probe in progress
    ///
    /// # Errors
    /// Returns `Exhausted` if `ordinal` is outside the window, `Busy` if
    /// the handle is reserved or live
    pub fn reserve(&self, ordinal: u32) -> Result<Reservation<'_>> {
        let mut entries = self.entries.write();
        let max = entries.len() as u32;
        if ordinal >= max {
            return Err(PcdError::Exhausted { max });
        }

        let devnum = self.base + ordinal;
        let index = ordinal as usize;
        match entries[index] {
            Entry::Vacant => entries[index] = Entry::Reserved,
            _ => return Err(PcdError::Busy { devnum }),
        }

        Ok(Reservation {
            registry: self,
            index,
            devnum,
            committed: false,
        })
    }

    /// Resolve a handle to its live slot
    ///
    /// # Errors
    /// Returns `NotFound` for unknown, reserved or retired handles
    pub fn lookup(&self, devnum: DevNum) -> Result<Arc<DeviceSlot>> {
        let entries = self.entries.read();
        let found = self
            .ordinal_of(devnum, entries.len())
            .and_then(|ordinal| match &entries[ordinal] {
                Entry::Live(slot) if slot.is_live() => Some(Arc::clone(slot)),
                _ => None,
            });
        found.ok_or(PcdError::NotFound { devnum })
    }

    /// Detach the slot at `devnum`
    ///
    /// The slot is marked retired before it leaves the table. Callers
    /// holding their own `Arc` keep valid memory until they drop it.
    pub fn remove(&self, devnum: DevNum) -> Option<Arc<DeviceSlot>> {
        let mut entries = self.entries.write();
        let ordinal = self.ordinal_of(devnum, entries.len())?;
        if !matches!(entries[ordinal], Entry::Live(_)) {
            return None;
        }

        match std::mem::replace(&mut entries[ordinal], Entry::Vacant) {
            Entry::Live(slot) => {
                slot.mark_removed();
                log::debug!("registry: {} removed", devnum);
                Some(slot)
            }
            _ => None,
        }
    }

    /// Number of live slots
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .iter()
            .filter(|e| matches!(e, Entry::Live(_)))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Handles of all live slots, ascending
    pub fn handles(&self) -> Vec<DevNum> {
        self.entries
            .read()
            .iter()
            .filter_map(|e| match e {
                Entry::Live(slot) => Some(slot.devnum()),
                _ => None,
            })
            .collect()
    }
}

/// Claimed, not yet live, registry handle
pub struct Reservation<'a> {
    registry: &'a DeviceRegistry,
    index: usize,
    devnum: DevNum,
    committed: bool,
}

impl Reservation<'_> {
    /// Handle this reservation holds
    pub fn devnum(&self) -> DevNum {
        self.devnum
    }

    /// Publish `slot` under the reserved handle
    pub fn commit(mut self, slot: Arc<DeviceSlot>) {
        debug_assert_eq!(slot.devnum(), self.devnum);
        self.registry.entries.write()[self.index] = Entry::Live(slot);
        self.committed = true;
        log::debug!("registry: {} committed", self.devnum);
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut entries = self.registry.entries.write();
        if matches!(entries[self.index], Entry::Reserved) {
            entries[self.index] = Entry::Vacant;
            log::debug!("registry: reservation of {} released", self.devnum);
        }
    }
}
