//! Platform driver - instances created per matched platform device
//!
//! The driver allocates one device-number region up front and then turns
//! each `probe` from the bus into a [`DeviceManager::attach`] for the
//! device's id, and each `remove` into a detach. Devices read their size,
//! permission and serial from [`PcdevPlatformData`].

use std::sync::Arc;

use pcd_chardev::{DevNum, Errno, Exposure, IoBinding, NumberAllocator};
use pcd_platform::{PlatformDevice, PlatformDriver};

use crate::config::DriverConfig;
use crate::dispatch::FileOperations;
use crate::error::{PcdError, Result};
use crate::lifecycle::DeviceManager;
use crate::pdata::PcdevPlatformData;

/// Platform match name
pub const PCD_DRIVER_NAME: &str = "pseudo-char_device";

/// Device numbers reserved by the driver
pub const MAX_DEVICES: u32 = 10;

pub const CLASS_NAME: &str = "pcd_class";

/// Owner name of the device-number region
pub const REGION_NAME: &str = "pcdevs";

/// Nodes are named `pcdev-{id}`
pub const NODE_PREFIX: &str = "pcdev-";

/// Pseudo character device platform driver
pub struct PcdPlatformDriver {
    name: String,
    manager: DeviceManager,
}

impl PcdPlatformDriver {
    /// Load the driver
    ///
    /// # Arguments
    /// * `settings` - Driver name, region size and owner name
    /// * `region` - Allocator the device-number region is taken from
    /// * `cdevs` - Binding layer for the devices' file operations
    /// * `class` - Exposure layer for the devices' nodes
    ///
    /// # Errors
    /// Returns `Region` if no device numbers can be allocated
    pub fn init(
        settings: &DriverConfig,
        region: &mut dyn NumberAllocator,
        cdevs: Arc<dyn IoBinding<dyn FileOperations>>,
        class: Arc<dyn Exposure>,
    ) -> Result<Self> {
        let base = region
            .alloc_chrdev_region(0, settings.max_devices, &settings.region)
            .map_err(|err| {
                log::error!("chrdev region allocation failed: {}", err);
                PcdError::Region(err)
            })?;

        let manager = DeviceManager::new(base, settings.max_devices, NODE_PREFIX, cdevs, class);
        log::info!(
            "pcd platform driver loaded: {} ({} devices from {})",
            settings.name,
            settings.max_devices,
            base
        );
        Ok(Self {
            name: settings.name.clone(),
            manager,
        })
    }

    pub fn manager(&self) -> &DeviceManager {
        &self.manager
    }

    /// First device number of the driver's region
    pub fn base(&self) -> DevNum {
        self.manager.base()
    }

    /// Probe `pdev`, reporting the precise failure
    pub fn probe_device(&self, pdev: &PlatformDevice) -> Result<DevNum> {
        log::info!("probing {}.{}", pdev.name(), pdev.id());
        self.manager
            .attach(pdev.id(), pdev.platform_data::<PcdevPlatformData>())
    }

    /// Unload the driver
    ///
    /// Removes any device still attached and releases the region. Callers
    /// normally unregister the driver from the bus first.
    pub fn exit(&self, region: &mut dyn NumberAllocator) {
        self.manager.shutdown();
        region.unregister_chrdev_region(self.manager.base(), self.manager.max_devices());
        log::info!("pcd platform driver unloaded");
    }
}

impl PlatformDriver for PcdPlatformDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&self, pdev: &PlatformDevice) -> core::result::Result<(), Errno> {
        self.probe_device(pdev).map(|_| ()).map_err(|err| err.errno())
    }

    fn remove(&self, pdev: &PlatformDevice) {
        self.manager.detach(pdev.id());
    }
}
