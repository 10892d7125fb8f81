//! Device-Number Regions - `alloc_chrdev_region` and friends
//!
//! Drivers reserve a contiguous block of minors before creating any device.
//! Dynamic majors are handed out from [`CHRDEV_MAJOR_DYN_START`] downward,
//! mirroring the kernel's dynamic range.

use alloc::string::{String, ToString};
use alloc::vec::Vec;

use crate::{ChardevError, DevNum, NumberAllocator, Result, MINORMASK};

/// First (highest) dynamically assigned major
pub const CHRDEV_MAJOR_DYN_START: u32 = 254;

/// Last (lowest) dynamically assigned major
pub const CHRDEV_MAJOR_DYN_END: u32 = 234;

/// Registered region of device numbers
#[derive(Debug, Clone)]
struct RegionEntry {
    base: DevNum,
    count: u32,
    name: String,
}

impl RegionEntry {
    fn overlaps(&self, base: DevNum, count: u32) -> bool {
        if self.base.major() != base.major() {
            return false;
        }
        let start = self.base.minor();
        let end = start + self.count;
        let other_start = base.minor();
        let other_end = other_start + count;
        start < other_end && other_start < end
    }
}

/// Device-number allocator
pub struct ChrdevRegion {
    /// Currently registered regions
    regions: Vec<RegionEntry>,
}

impl ChrdevRegion {
    pub fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Claim a fixed region (`register_chrdev_region`)
    ///
    /// # Errors
    /// Returns error if the range is empty, leaves the minor space, or
    /// overlaps a registered region
    pub fn register_chrdev_region(&mut self, base: DevNum, count: u32, name: &str) -> Result<()> {
        check_range(base.minor(), count)?;

        if self.regions.iter().any(|r| r.overlaps(base, count)) {
            return Err(ChardevError::Busy { base, count });
        }

        self.regions.push(RegionEntry {
            base,
            count,
            name: name.to_string(),
        });
        log::debug!("chrdev region {}+{} registered for {}", base, count, name);
        Ok(())
    }

    /// Is `devnum` inside any registered region?
    pub fn is_registered(&self, devnum: DevNum) -> bool {
        self.regions.iter().any(|r| r.overlaps(devnum, 1))
    }

    /// Owner name of the region containing `devnum`
    pub fn owner(&self, devnum: DevNum) -> Option<&str> {
        self.regions
            .iter()
            .find(|r| r.overlaps(devnum, 1))
            .map(|r| r.name.as_str())
    }

    /// Number of registered regions
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    fn major_in_use(&self, major: u32) -> bool {
        self.regions.iter().any(|r| r.base.major() == major)
    }
}

impl Default for ChrdevRegion {
    fn default() -> Self {
        Self::new()
    }
}

impl NumberAllocator for ChrdevRegion {
    fn alloc_chrdev_region(&mut self, first_minor: u32, count: u32, name: &str) -> Result<DevNum> {
        check_range(first_minor, count)?;

        // Scan the dynamic range from the top for an unused major
        let major = (CHRDEV_MAJOR_DYN_END..=CHRDEV_MAJOR_DYN_START)
            .rev()
            .find(|&major| !self.major_in_use(major))
            .ok_or(ChardevError::NoMajors)?;

        let base = DevNum::new(major, first_minor);
        self.regions.push(RegionEntry {
            base,
            count,
            name: name.to_string(),
        });
        log::debug!("chrdev region {}+{} allocated for {}", base, count, name);
        Ok(base)
    }

    fn unregister_chrdev_region(&mut self, base: DevNum, count: u32) {
        match self
            .regions
            .iter()
            .position(|r| r.base == base && r.count == count)
        {
            Some(index) => {
                let region = self.regions.remove(index);
                log::debug!("chrdev region {}+{} ({}) unregistered", base, count, region.name);
            }
            None => log::warn!("unregister of unknown chrdev region {}+{}", base, count),
        }
    }
}

fn check_range(first_minor: u32, count: u32) -> Result<()> {
    let last = first_minor.checked_add(count);
    match last {
        Some(last) if count > 0 && last - 1 <= MINORMASK => Ok(()),
        _ => Err(ChardevError::InvalidRange { first_minor, count }),
    }
}
