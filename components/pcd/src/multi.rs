//! Static multi-device driver
//!
//! All devices are known when the driver loads: one region is allocated
//! for the whole table and every entry is attached in order. If any entry
//! fails, the ones already attached are detached in reverse and the region
//! is released before the error is returned.

use std::sync::Arc;

use pcd_chardev::{DevNum, Exposure, IoBinding, NumberAllocator};

use crate::dispatch::FileOperations;
use crate::error::{PcdError, Result};
use crate::lifecycle::DeviceManager;
use crate::pdata::PcdevPlatformData;
use crate::perm::Permission;

/// Owner name of the static driver's region
pub const MULTI_REGION_NAME: &str = "pseudo_device";

/// Nodes are named `pcd{index}`
pub const MULTI_NODE_PREFIX: &str = "pcd";

/// The four-device table: two single-direction devices and two read/write
pub fn default_devices() -> Vec<PcdevPlatformData> {
    vec![
        PcdevPlatformData::new(1024, Permission::RDONLY, "PCDEV1"),
        PcdevPlatformData::new(512, Permission::WRONLY, "PCDEV2"),
        PcdevPlatformData::new(1024, Permission::RDWR, "PCDEV3"),
        PcdevPlatformData::new(512, Permission::RDWR, "PCDEV4"),
    ]
}

/// One 512 byte read/write device
pub fn single_device() -> Vec<PcdevPlatformData> {
    vec![PcdevPlatformData::new(512, Permission::RDWR, "PCD")]
}

/// Driver for a fixed table of pseudo devices
pub struct PcdMultiDriver {
    manager: DeviceManager,
}

impl PcdMultiDriver {
    /// Load the driver and attach every device in `devices`
    ///
    /// # Errors
    /// Returns `Region` if no device numbers can be allocated, otherwise the
    /// first attach failure; nothing stays registered in either case
    pub fn init(
        devices: &[PcdevPlatformData],
        region: &mut dyn NumberAllocator,
        cdevs: Arc<dyn IoBinding<dyn FileOperations>>,
        class: Arc<dyn Exposure>,
    ) -> Result<Self> {
        let count = devices.len() as u32;
        let base = region
            .alloc_chrdev_region(0, count, MULTI_REGION_NAME)
            .map_err(|err| {
                log::error!("chrdev region allocation failed: {}", err);
                PcdError::Region(err)
            })?;
        log::info!("device number <major>:<minor> = {} (+{})", base, count);

        let manager = DeviceManager::new(base, count, MULTI_NODE_PREFIX, cdevs, class);
        for (ordinal, pdata) in (0..count).zip(devices) {
            if let Err(err) = manager.attach(ordinal, Some(pdata)) {
                log::error!("module insertion failed at device {}: {}", ordinal, err);
                manager.shutdown();
                region.unregister_chrdev_region(base, count);
                return Err(err);
            }
        }

        log::info!("module init was successful");
        Ok(Self { manager })
    }

    pub fn manager(&self) -> &DeviceManager {
        &self.manager
    }

    /// Device number of the device at `index`
    pub fn devnum(&self, index: u32) -> Option<DevNum> {
        (index < self.manager.max_devices()).then(|| self.manager.base() + index)
    }

    /// Unload the driver
    pub fn exit(self, region: &mut dyn NumberAllocator) {
        self.manager.shutdown();
        region.unregister_chrdev_region(self.manager.base(), self.manager.max_devices());
        log::info!("module unloaded");
    }
}
