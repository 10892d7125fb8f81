//! I/O Dispatcher - open/read/write/llseek/release against a device slot
//!
//! [`FileOperations`] is the surface the binding layer routes device numbers
//! to. [`PcdFops`] implements it over the registry: every call resolves the
//! session's slot again and fails with `NotFound` once teardown has begun.
//!
//! [`File`] is the caller's side of that route: it resolves a binding (or a
//! node name), opens a session and releases it when closed or dropped.

use std::sync::{Arc, Weak};

use pcd_chardev::{CdevMap, DevNum, DeviceClass, UserRead, UserWrite};

use crate::error::{PcdError, Result};
use crate::perm::Access;
use crate::registry::DeviceRegistry;
use crate::slot::DeviceSlot;

/// Seek origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// `SEEK_SET`
    FromStart,
    /// `SEEK_CUR`
    FromCurrent,
    /// `SEEK_END`
    FromEnd,
}

impl TryFrom<i32> for Whence {
    type Error = PcdError;

    fn try_from(whence: i32) -> Result<Self> {
        match whence {
            0 => Ok(Whence::FromStart),
            1 => Ok(Whence::FromCurrent),
            2 => Ok(Whence::FromEnd),
            _ => Err(PcdError::InvalidWhence { whence }),
        }
    }
}

/// Per-open cursor over one device
///
/// Holds only a weak reference, so an open session never keeps a removed
/// device alive.
#[derive(Debug)]
pub struct Session {
    devnum: DevNum,
    slot: Weak<DeviceSlot>,
    pos: u64,
}

impl Session {
    pub(crate) fn new(devnum: DevNum, slot: &Arc<DeviceSlot>) -> Self {
        Self {
            devnum,
            slot: Arc::downgrade(slot),
            pos: 0,
        }
    }

    /// Session that resolves to nothing
    fn detached(devnum: DevNum) -> Self {
        Self {
            devnum,
            slot: Weak::new(),
            pos: 0,
        }
    }

    pub fn devnum(&self) -> DevNum {
        self.devnum
    }

    /// Current cursor offset
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Pin the slot for the duration of one call
    fn slot(&self) -> Result<Arc<DeviceSlot>> {
        self.slot
            .upgrade()
            .filter(|slot| slot.is_live())
            .ok_or(PcdError::NotFound {
                devnum: self.devnum,
            })
    }
}

/// Operations a bound character device provides
pub trait FileOperations: Send + Sync {
    /// Open a session on `devnum`
    ///
    /// # Errors
    /// Returns `NotFound` if no live device has this number
    fn open(&self, devnum: DevNum) -> Result<Session>;

    /// Copy up to `len` bytes at the cursor into `dst`
    ///
    /// # Returns
    /// Bytes read; 0 at end of device
    ///
    /// # Errors
    /// Returns `PermissionDenied` on write-only devices, `FaultBoundary` if
    /// `dst` faults (the cursor does not move)
    fn read(&self, session: &mut Session, dst: &mut dyn UserWrite, len: usize) -> Result<usize>;

    /// Copy up to `len` bytes from `src` into the device at the cursor
    ///
    /// # Returns
    /// Bytes written
    ///
    /// # Errors
    /// Returns `PermissionDenied` on read-only devices, `OutOfSpace` when
    /// nothing fits, `FaultBoundary` if `src` faults (the cursor does not
    /// move)
    fn write(&self, session: &mut Session, src: &dyn UserRead, len: usize) -> Result<usize>;

    /// Reposition the cursor
    ///
    /// # Errors
    /// Returns `InvalidOffset` if the target falls outside `0..=capacity`
    fn llseek(&self, session: &mut Session, offset: i64, whence: Whence) -> Result<u64>;

    /// End a session
    fn release(&self, session: Session);
}

/// File operations for pseudo devices in a registry
pub struct PcdFops {
    registry: Arc<DeviceRegistry>,
}

impl PcdFops {
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }
}

fn deny(slot: &DeviceSlot, access: Access) -> PcdError {
    log::warn!("{}: {} not permitted ({})", slot.devnum(), access, slot.perm());
    PcdError::PermissionDenied {
        devnum: slot.devnum(),
        access,
    }
}

impl FileOperations for PcdFops {
    fn open(&self, devnum: DevNum) -> Result<Session> {
        let slot = self.registry.lookup(devnum)?;
        log::info!(
            "open was successful: {} (serial {}, {} bytes, {})",
            devnum,
            slot.serial(),
            slot.capacity(),
            slot.perm()
        );
        Ok(Session::new(devnum, &slot))
    }

    fn read(&self, session: &mut Session, dst: &mut dyn UserWrite, len: usize) -> Result<usize> {
        let slot = session.slot()?;
        log::info!("read requested for {} bytes", len);
        log::info!("current file position = {}", session.pos);

        if !slot.perm().can_read() {
            return Err(deny(&slot, Access::Read));
        }

        let capacity = slot.capacity() as u64;
        if session.pos >= capacity {
            log::warn!("{}: end of device", slot.devnum());
            return Ok(0);
        }

        let start = session.pos as usize;
        let count = len.min(slot.capacity() - start);
        {
            let buffer = slot.lock_buffer();
            dst.copy_to_user(&buffer[start..start + count])
                .map_err(|fault| {
                    log::error!("{}: copy to user faulted after {} bytes", slot.devnum(), fault.copied);
                    PcdError::FaultBoundary {
                        copied: fault.copied,
                    }
                })?;
        }

        session.pos += count as u64;
        log::info!("number of bytes successfully read = {}", count);
        log::info!("updated file position = {}", session.pos);
        Ok(count)
    }

    fn write(&self, session: &mut Session, src: &dyn UserRead, len: usize) -> Result<usize> {
        let slot = session.slot()?;
        log::info!("write requested for {} bytes", len);
        log::info!("current file position = {}", session.pos);

        if !slot.perm().can_write() {
            return Err(deny(&slot, Access::Write));
        }

        let remaining = (slot.capacity() as u64).saturating_sub(session.pos) as usize;
        let count = len.min(remaining);
        if count == 0 {
            log::warn!("{}: no space left on the device", slot.devnum());
            return Err(PcdError::OutOfSpace {
                devnum: slot.devnum(),
            });
        }

        let start = session.pos as usize;
        {
            let mut buffer = slot.lock_buffer();
            src.copy_from_user(&mut buffer[start..start + count])
                .map_err(|fault| {
                    log::error!("{}: copy from user faulted after {} bytes", slot.devnum(), fault.copied);
                    PcdError::FaultBoundary {
                        copied: fault.copied,
                    }
                })?;
        }

        session.pos += count as u64;
        log::info!("number of bytes successfully written = {}", count);
        log::info!("updated file position = {}", session.pos);
        Ok(count)
    }

    fn llseek(&self, session: &mut Session, offset: i64, whence: Whence) -> Result<u64> {
        let slot = session.slot()?;
        let capacity = slot.capacity() as i128;
        log::info!("lseek requested");
        log::info!("current value of the file position = {}", session.pos);

        let offset = i128::from(offset);
        let target = match whence {
            Whence::FromStart => offset,
            Whence::FromCurrent => i128::from(session.pos) + offset,
            Whence::FromEnd => capacity + offset,
        };
        if target < 0 || target > capacity {
            return Err(PcdError::InvalidOffset { target });
        }

        session.pos = target as u64;
        log::info!("new value of the file position = {}", session.pos);
        Ok(session.pos)
    }

    fn release(&self, session: Session) {
        log::info!("release was successful: {}", session.devnum);
    }
}

/// Binding table routing device numbers to file operations
pub type CdevTable = CdevMap<dyn FileOperations>;

/// An open device, as seen by a caller outside the driver
pub struct File {
    ops: Arc<dyn FileOperations>,
    devnum: DevNum,
    session: Session,
}

impl File {
    /// Open `devnum` through its cdev binding
    ///
    /// # Errors
    /// Returns `NotFound` if nothing is bound to `devnum` or the device is gone
    pub fn open(cdevs: &CdevTable, devnum: DevNum) -> Result<Self> {
        let ops = cdevs.lookup(devnum).ok_or(PcdError::NotFound { devnum })?;
        let session = ops.open(devnum)?;
        Ok(Self {
            ops,
            devnum,
            session,
        })
    }

    /// Open the device published as `name` in `class`
    ///
    /// # Errors
    /// Returns `UnknownNode` if no node has that name, otherwise as [`File::open`]
    pub fn open_by_name(class: &DeviceClass, cdevs: &CdevTable, name: &str) -> Result<Self> {
        let devnum = class
            .find_by_name(name)
            .ok_or_else(|| PcdError::UnknownNode {
                name: name.to_string(),
            })?;
        Self::open(cdevs, devnum)
    }

    pub fn devnum(&self) -> DevNum {
        self.devnum
    }

    pub fn position(&self) -> u64 {
        self.session.position()
    }

    pub fn read(&mut self, dst: &mut dyn UserWrite, len: usize) -> Result<usize> {
        self.ops.read(&mut self.session, dst, len)
    }

    pub fn write(&mut self, src: &dyn UserRead, len: usize) -> Result<usize> {
        self.ops.write(&mut self.session, src, len)
    }

    pub fn llseek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        self.ops.llseek(&mut self.session, offset, whence)
    }

    /// Release the session now
    pub fn close(self) {}
}

impl Drop for File {
    fn drop(&mut self) {
        let session = core::mem::replace(&mut self.session, Session::detached(self.devnum));
        self.ops.release(session);
    }
}
