//! Lifecycle Manager - probe and remove for device instances
//!
//! # Probe
//! `attach` acquires, in order: a registry reservation, the device buffer,
//! the cdev binding and the device node. Each is held by an owner that
//! releases it on drop, so an early return unwinds exactly what was
//! acquired, newest first. The reservation is committed last; until then
//! the device is invisible to dispatch.
//!
//! # Remove
//! `detach` retires the slot (new calls fail with `NotFound`), withdraws
//! the node, unbinds the cdev, drops the registry entry and decrements the
//! device count. It never fails.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use pcd_chardev::{CdevToken, DevNum, DeviceToken, Exposure, IoBinding};
use spin::Mutex;

use crate::dispatch::{FileOperations, PcdFops};
use crate::error::{PcdError, Result};
use crate::pdata::PcdevPlatformData;
use crate::registry::DeviceRegistry;
use crate::slot::{DeviceBuffer, DeviceSlot};

/// Where an instance is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Unattached,
    Probing,
    Live,
    Removing,
}

/// Cdev binding, unbound when dropped
struct CdevBinding {
    cdevs: Arc<dyn IoBinding<dyn FileOperations>>,
    token: Option<CdevToken>,
}

impl CdevBinding {
    fn bind(
        cdevs: &Arc<dyn IoBinding<dyn FileOperations>>,
        devnum: DevNum,
        ops: Arc<dyn FileOperations>,
    ) -> Result<Self> {
        let token = cdevs.bind(devnum, ops).map_err(PcdError::BindingFailed)?;
        log::debug!("{}: cdev bound (token {})", devnum, token.id());
        Ok(Self {
            cdevs: Arc::clone(cdevs),
            token: Some(token),
        })
    }
}

impl Drop for CdevBinding {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            log::debug!("{}: cdev unbound (token {})", token.devnum(), token.id());
            self.cdevs.unbind(token);
        }
    }
}

/// Published device node, withdrawn when dropped
struct ExposedNode {
    class: Arc<dyn Exposure>,
    token: Option<DeviceToken>,
}

impl ExposedNode {
    fn expose(class: &Arc<dyn Exposure>, devnum: DevNum, name: &str) -> Result<Self> {
        let token = class.expose(devnum, name).map_err(PcdError::ExposureFailed)?;
        log::debug!("{}: node {:?} exposed", devnum, token.name());
        Ok(Self {
            class: Arc::clone(class),
            token: Some(token),
        })
    }
}

impl Drop for ExposedNode {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            log::debug!("{}: node {:?} withdrawn", token.devnum(), token.name());
            self.class.withdraw(token);
        }
    }
}

enum Instance {
    Unattached,
    Probing,
    // Field order is teardown order
    Live {
        devnum: DevNum,
        node: ExposedNode,
        cdev: CdevBinding,
    },
    Removing,
}

impl Instance {
    fn state(&self) -> LifecycleState {
        match self {
            Instance::Unattached => LifecycleState::Unattached,
            Instance::Probing => LifecycleState::Probing,
            Instance::Live { .. } => LifecycleState::Live,
            Instance::Removing => LifecycleState::Removing,
        }
    }
}

/// Creates and destroys device instances on attach/detach
pub struct DeviceManager {
    registry: Arc<DeviceRegistry>,
    fops: Arc<PcdFops>,
    cdevs: Arc<dyn IoBinding<dyn FileOperations>>,
    class: Arc<dyn Exposure>,
    node_prefix: String,
    instances: Mutex<Vec<Instance>>,
    total_devices: AtomicUsize,
}

impl DeviceManager {
    /// Create a manager for `max_devices` instances numbered from `base`
    ///
    /// # Arguments
    /// * `base` - First device number of an allocated region
    /// * `max_devices` - Number of device numbers in the region
    /// * `node_prefix` - Node names are `{node_prefix}{ordinal}`
    /// * `cdevs` - Binding layer the file operations are registered with
    /// * `class` - Exposure layer device nodes are published in
    pub fn new(
        base: DevNum,
        max_devices: u32,
        node_prefix: &str,
        cdevs: Arc<dyn IoBinding<dyn FileOperations>>,
        class: Arc<dyn Exposure>,
    ) -> Self {
        let registry = Arc::new(DeviceRegistry::new(base, max_devices));
        let fops = Arc::new(PcdFops::new(Arc::clone(&registry)));
        let instances = (0..max_devices).map(|_| Instance::Unattached).collect();
        Self {
            registry,
            fops,
            cdevs,
            class,
            node_prefix: node_prefix.to_string(),
            instances: Mutex::new(instances),
            total_devices: AtomicUsize::new(0),
        }
    }

    pub fn base(&self) -> DevNum {
        self.registry.base()
    }

    pub fn max_devices(&self) -> u32 {
        self.registry.max_devices()
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// File operations shared by every instance
    pub fn fops(&self) -> Arc<dyn FileOperations> {
        Arc::clone(&self.fops) as Arc<dyn FileOperations>
    }

    /// Node name an ordinal is published under
    pub fn node_name(&self, ordinal: u32) -> String {
        format!("{}{}", self.node_prefix, ordinal)
    }

    /// Number of live instances
    pub fn total_devices(&self) -> usize {
        self.total_devices.load(Ordering::Acquire)
    }

    pub fn state(&self, ordinal: u32) -> Option<LifecycleState> {
        self.instances
            .lock()
            .get(ordinal as usize)
            .map(Instance::state)
    }

    /// Ordinals currently live, ascending
    pub fn live_ordinals(&self) -> Vec<u32> {
        self.instances
            .lock()
            .iter()
            .enumerate()
            .filter(|(_, instance)| matches!(instance, Instance::Live { .. }))
            .map(|(ordinal, _)| ordinal as u32)
            .collect()
    }

    /// Probe the instance at `ordinal`
    ///
    /// # Returns
    /// The device number of the new instance
    ///
    /// # Errors
    /// - `Exhausted` if `ordinal` is outside the region
    /// - `Busy` if the ordinal is not unattached
    /// - `MissingConfig` / `InvalidConfig` for absent or unusable platform data
    /// - `AllocationFailed`, `BindingFailed`, `ExposureFailed` from the
    ///   corresponding step; everything acquired before it is released
    pub fn attach(&self, ordinal: u32, pdata: Option<&PcdevPlatformData>) -> Result<DevNum> {
        self.begin_probe(ordinal)?;
        log::info!("a device is detected (ordinal {})", ordinal);

        let outcome = self.probe(ordinal, pdata);
        let mut instances = self.instances.lock();
        match outcome {
            Ok((devnum, node, cdev)) => {
                instances[ordinal as usize] = Instance::Live { devnum, node, cdev };
                drop(instances);
                log::info!("probe was successful: {} ({})", devnum, self.node_name(ordinal));
                Ok(devnum)
            }
            Err(err) => {
                instances[ordinal as usize] = Instance::Unattached;
                drop(instances);
                log::error!("probe of ordinal {} failed: {}", ordinal, err);
                Err(err)
            }
        }
    }

    fn begin_probe(&self, ordinal: u32) -> Result<()> {
        let mut instances = self.instances.lock();
        let max = instances.len() as u32;
        let instance = instances
            .get_mut(ordinal as usize)
            .ok_or(PcdError::Exhausted { max })?;
        if !matches!(instance, Instance::Unattached) {
            return Err(PcdError::Busy {
                devnum: self.registry.base() + ordinal,
            });
        }
        *instance = Instance::Probing;
        Ok(())
    }

    fn probe(
        &self,
        ordinal: u32,
        pdata: Option<&PcdevPlatformData>,
    ) -> Result<(DevNum, ExposedNode, CdevBinding)> {
        let pdata = pdata.ok_or(PcdError::MissingConfig { id: ordinal })?;
        if pdata.size == 0 {
            return Err(PcdError::InvalidConfig {
                id: ordinal,
                reason: "device size must be positive".to_string(),
            });
        }
        log::info!("device serial number = {}", pdata.serial_number);
        log::info!("device size = {}", pdata.size);
        log::info!("device permission = {}", pdata.perm);

        // Released in reverse on any early return
        let reservation = self.registry.reserve(ordinal)?;
        let devnum = reservation.devnum();
        let buffer = DeviceBuffer::zeroed(pdata.size)?;
        let cdev = CdevBinding::bind(&self.cdevs, devnum, self.fops())?;
        let node = ExposedNode::expose(&self.class, devnum, &self.node_name(ordinal))?;

        let slot = DeviceSlot::new(devnum, buffer, pdata.perm, &pdata.serial_number);
        reservation.commit(Arc::new(slot));
        self.total_devices.fetch_add(1, Ordering::AcqRel);
        Ok((devnum, node, cdev))
    }

    /// Remove the instance at `ordinal`
    ///
    /// Calls already dispatched finish against resident memory; calls made
    /// afterwards fail with `NotFound`. Detaching an ordinal that is not
    /// live does nothing.
    pub fn detach(&self, ordinal: u32) {
        let taken = {
            let mut instances = self.instances.lock();
            match instances.get_mut(ordinal as usize) {
                Some(instance @ Instance::Live { .. }) => {
                    Some(core::mem::replace(instance, Instance::Removing))
                }
                _ => None,
            }
        };

        let Some(Instance::Live { devnum, node, cdev }) = taken else {
            log::warn!("detach of ordinal {} ignored: not attached", ordinal);
            return;
        };

        if let Ok(slot) = self.registry.lookup(devnum) {
            slot.mark_removed();
        }
        drop(node);
        drop(cdev);
        self.registry.remove(devnum);
        self.total_devices.fetch_sub(1, Ordering::AcqRel);

        self.instances.lock()[ordinal as usize] = Instance::Unattached;
        log::info!("a device is removed: {}", devnum);
    }

    /// Detach every live instance, highest ordinal first
    pub fn shutdown(&self) {
        for ordinal in self.live_ordinals().into_iter().rev() {
            self.detach(ordinal);
        }
    }
}
