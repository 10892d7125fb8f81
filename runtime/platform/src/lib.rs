//! Platform Bus - Attach/detach signals for platform drivers
//!
//! This crate provides the device model that drives a platform driver's
//! lifecycle: devices and drivers are registered independently, the bus
//! matches them by name, and calls the driver's `probe` on attach and
//! `remove` on detach.
//!
//! A device carries opaque platform data (size, permissions, serial, ...)
//! which the driver downcasts to its own type in `probe`.

use std::any::Any;
use std::sync::Arc;

use pcd_chardev::Errno;
use spin::Mutex;
use thiserror::Error;

/// Platform bus error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("Probe of {name}.{id} failed: {errno}")]
    ProbeFailed { name: String, id: u32, errno: Errno },

    #[error("Device {name}.{id} already registered")]
    DuplicateDevice { name: String, id: u32 },

    #[error("Driver {name} already registered")]
    DuplicateDriver { name: String },

    #[error("Device {name}.{id} not registered")]
    DeviceNotFound { name: String, id: u32 },

    #[error("Driver {name} not registered")]
    DriverNotFound { name: String },
}

pub type Result<T> = core::result::Result<T, PlatformError>;

/// Device on the platform bus
#[derive(Clone)]
pub struct PlatformDevice {
    name: String,
    id: u32,
    platform_data: Option<Arc<dyn Any + Send + Sync>>,
}

impl PlatformDevice {
    /// Create a device with no platform data
    pub fn new(name: &str, id: u32) -> Self {
        Self {
            name: name.to_string(),
            id,
            platform_data: None,
        }
    }

    /// Attach platform data for the driver to pick up at probe time
    pub fn with_platform_data<T: Any + Send + Sync>(mut self, data: T) -> Self {
        self.platform_data = Some(Arc::new(data));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance id; drivers derive the minor number from it
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Platform data of type `T` (`dev_get_platdata`)
    ///
    /// # Returns
    /// `None` if no data was attached or it is of another type
    pub fn platform_data<T: Any>(&self) -> Option<&T> {
        self.platform_data.as_deref()?.downcast_ref::<T>()
    }

    pub fn has_platform_data(&self) -> bool {
        self.platform_data.is_some()
    }
}

impl core::fmt::Debug for PlatformDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PlatformDevice")
            .field("name", &self.name)
            .field("id", &self.id)
            .field("has_platform_data", &self.platform_data.is_some())
            .finish()
    }
}

/// Trait for platform driver lifecycle
pub trait PlatformDriver: Send + Sync {
    /// Driver name, matched against device names
    fn name(&self) -> &str;

    /// Additional compatible device names
    fn id_table(&self) -> &[&str] {
        &[]
    }

    /// Called when a matching device is found
    ///
    /// # Errors
    /// A failed probe leaves the device registered but unbound
    fn probe(&self, pdev: &PlatformDevice) -> core::result::Result<(), Errno>;

    /// Called when a bound device goes away. Removal cannot fail.
    fn remove(&self, pdev: &PlatformDevice);
}

fn driver_matches(driver: &dyn PlatformDriver, pdev: &PlatformDevice) -> bool {
    driver.name() == pdev.name() || driver.id_table().iter().any(|&c| c == pdev.name())
}

struct DeviceRecord {
    pdev: PlatformDevice,
    driver: Option<Arc<dyn PlatformDriver>>,
}

impl DeviceRecord {
    fn is(&self, name: &str, id: u32) -> bool {
        self.pdev.name() == name && self.pdev.id() == id
    }
}

#[derive(Default)]
struct BusState {
    devices: Vec<DeviceRecord>,
    drivers: Vec<Arc<dyn PlatformDriver>>,
}

/// Platform bus
///
/// Probe and remove callbacks run with the bus lock held, so lifecycle
/// events on one bus are serialized.
#[derive(Default)]
pub struct PlatformBus {
    state: Mutex<BusState>,
}

impl PlatformBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device and probe it against the registered drivers
    ///
    /// # Errors
    /// Returns error if the device is a duplicate, or if the matching
    /// driver's probe fails (the device stays registered, unbound)
    pub fn register_device(&self, pdev: PlatformDevice) -> Result<()> {
        let mut state = self.state.lock();
        if state.devices.iter().any(|d| d.is(pdev.name(), pdev.id())) {
            return Err(PlatformError::DuplicateDevice {
                name: pdev.name().to_string(),
                id: pdev.id(),
            });
        }

        let driver = state
            .drivers
            .iter()
            .find(|drv| driver_matches(drv.as_ref(), &pdev))
            .cloned();

        log::info!("platform device {}.{} registered", pdev.name(), pdev.id());

        let mut record = DeviceRecord { pdev, driver: None };
        let outcome = match driver {
            Some(driver) => match probe_record(&mut record, driver) {
                Ok(()) => Ok(()),
                Err(errno) => Err(PlatformError::ProbeFailed {
                    name: record.pdev.name().to_string(),
                    id: record.pdev.id(),
                    errno,
                }),
            },
            None => Ok(()),
        };
        state.devices.push(record);
        outcome
    }

    /// Unregister a device, calling `remove` if it was bound
    ///
    /// # Errors
    /// Returns error if the device is not registered
    pub fn unregister_device(&self, name: &str, id: u32) -> Result<()> {
        let mut state = self.state.lock();
        let index = state
            .devices
            .iter()
            .position(|d| d.is(name, id))
            .ok_or_else(|| PlatformError::DeviceNotFound {
                name: name.to_string(),
                id,
            })?;

        let record = state.devices.remove(index);
        if let Some(driver) = record.driver {
            driver.remove(&record.pdev);
        }
        log::info!("platform device {}.{} unregistered", name, id);
        Ok(())
    }

    /// Register a driver and probe every unbound matching device
    ///
    /// # Returns
    /// Number of devices successfully bound
    ///
    /// # Errors
    /// Returns error if a driver with the same name exists. Individual
    /// probe failures are logged, not returned.
    pub fn register_driver(&self, driver: Arc<dyn PlatformDriver>) -> Result<usize> {
        let mut state = self.state.lock();
        if state.drivers.iter().any(|d| d.name() == driver.name()) {
            return Err(PlatformError::DuplicateDriver {
                name: driver.name().to_string(),
            });
        }
        state.drivers.push(Arc::clone(&driver));
        log::info!("platform driver {} registered", driver.name());

        let mut bound = 0;
        for record in state.devices.iter_mut() {
            if record.driver.is_some() || !driver_matches(driver.as_ref(), &record.pdev) {
                continue;
            }
            match probe_record(record, Arc::clone(&driver)) {
                Ok(()) => bound += 1,
                Err(errno) => log::error!(
                    "{}: probe of {}.{} failed: {}",
                    driver.name(),
                    record.pdev.name(),
                    record.pdev.id(),
                    errno
                ),
            }
        }
        Ok(bound)
    }

    /// Unregister a driver, removing every device bound to it
    ///
    /// # Errors
    /// Returns error if the driver is not registered
    pub fn unregister_driver(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        let index = state
            .drivers
            .iter()
            .position(|d| d.name() == name)
            .ok_or_else(|| PlatformError::DriverNotFound {
                name: name.to_string(),
            })?;
        let driver = state.drivers.remove(index);

        // Unbind in reverse registration order
        for record in state.devices.iter_mut().rev() {
            let bound_here = record
                .driver
                .as_ref()
                .is_some_and(|d| Arc::ptr_eq(d, &driver));
            if bound_here {
                driver.remove(&record.pdev);
                record.driver = None;
            }
        }
        log::info!("platform driver {} unregistered", name);
        Ok(())
    }

    /// Is the device currently bound to a driver?
    pub fn is_bound(&self, name: &str, id: u32) -> bool {
        self.state
            .lock()
            .devices
            .iter()
            .any(|d| d.is(name, id) && d.driver.is_some())
    }

    /// Name of the driver bound to a device
    pub fn bound_driver(&self, name: &str, id: u32) -> Option<String> {
        self.state
            .lock()
            .devices
            .iter()
            .find(|d| d.is(name, id))
            .and_then(|d| d.driver.as_ref().map(|drv| drv.name().to_string()))
    }

    pub fn device_count(&self) -> usize {
        self.state.lock().devices.len()
    }

    pub fn driver_count(&self) -> usize {
        self.state.lock().drivers.len()
    }
}

fn probe_record(
    record: &mut DeviceRecord,
    driver: Arc<dyn PlatformDriver>,
) -> core::result::Result<(), Errno> {
    log::info!(
        "{}: device {}.{} detected",
        driver.name(),
        record.pdev.name(),
        record.pdev.id()
    );
    driver.probe(&record.pdev)?;
    record.driver = Some(driver);
    Ok(())
}
