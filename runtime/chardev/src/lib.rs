//! Character Device Plumbing - Device numbers, bindings and device nodes
//!
//! # Purpose
//! Provides the kernel-side facilities a character driver leans on: a
//! device-number allocator, a cdev table that routes a device number to a
//! set of file operations, and a device class that publishes named nodes.
//!
//! # Integration Points
//! - Depends on: nothing outside `core`/`alloc`
//! - Provides to: pseudo character device drivers (`pcd`)
//! - Capabilities required: none (in-memory emulation)
//!
//! # Architecture
//! Each facility is a concrete type behind a small trait
//! ([`NumberAllocator`], [`IoBinding`], [`Exposure`]) so drivers can be
//! exercised against failing or instrumented implementations. The user-copy
//! trust boundary lives in [`uaccess`].
//!
//! # Testing Strategy
//! - Unit tests: Region allocation, binding/unbinding, name publication
//! - Integration tests: Full register/bind/expose/teardown sequences

#![no_std]

#[cfg(test)]
#[macro_use]
extern crate std;

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;

mod cdev;
mod class;
mod devnum;
mod errno;
mod region;
pub mod uaccess;

pub use cdev::CdevMap;
pub use class::DeviceClass;
pub use devnum::{DevNum, MINORBITS, MINORMASK};
pub use errno::Errno;
pub use region::{ChrdevRegion, CHRDEV_MAJOR_DYN_END, CHRDEV_MAJOR_DYN_START};
pub use uaccess::{UserBuffer, UserFault, UserRead, UserWrite};

use thiserror::Error;

/// Error types for character device plumbing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChardevError {
    #[error("No free dynamic major numbers")]
    NoMajors,

    #[error("Device number range {base}+{count} overlaps a registered region")]
    Busy { base: DevNum, count: u32 },

    #[error("Invalid device number range (first minor {first_minor}, count {count})")]
    InvalidRange { first_minor: u32, count: u32 },

    #[error("Device {devnum} already has a cdev bound")]
    AlreadyBound { devnum: DevNum },

    #[error("Device name {name:?} already exists")]
    NameTaken { name: String },

    #[error("Device {devnum} already exposed")]
    AlreadyExposed { devnum: DevNum },
}

impl ChardevError {
    /// Kernel error code for this failure
    pub fn errno(&self) -> Errno {
        match self {
            ChardevError::NoMajors => Errno::EBUSY,
            ChardevError::Busy { .. } => Errno::EBUSY,
            ChardevError::InvalidRange { .. } => Errno::EINVAL,
            ChardevError::AlreadyBound { .. } => Errno::EBUSY,
            ChardevError::NameTaken { .. } => Errno::EBUSY,
            ChardevError::AlreadyExposed { .. } => Errno::EBUSY,
        }
    }
}

pub type Result<T> = core::result::Result<T, ChardevError>;

/// Receipt for a cdev binding, handed back to [`IoBinding::unbind`]
#[derive(Debug, PartialEq, Eq)]
pub struct CdevToken {
    id: u64,
    devnum: DevNum,
}

impl CdevToken {
    pub fn new(id: u64, devnum: DevNum) -> Self {
        Self { id, devnum }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Device number the binding routes
    pub fn devnum(&self) -> DevNum {
        self.devnum
    }
}

/// Receipt for a published device node, handed back to [`Exposure::withdraw`]
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceToken {
    id: u64,
    devnum: DevNum,
    name: String,
}

impl DeviceToken {
    pub fn new(id: u64, devnum: DevNum, name: String) -> Self {
        Self { id, devnum, name }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn devnum(&self) -> DevNum {
        self.devnum
    }

    /// Node name as published
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Device-number region allocator
pub trait NumberAllocator {
    /// Reserve `count` consecutive minors under a dynamically chosen major
    ///
    /// # Returns
    /// The first device number of the region; per-instance numbers are
    /// `base + ordinal`
    ///
    /// # Errors
    /// Returns error if no major is free or the range is invalid
    fn alloc_chrdev_region(&mut self, first_minor: u32, count: u32, name: &str) -> Result<DevNum>;

    /// Release a region previously returned by `alloc_chrdev_region`
    fn unregister_chrdev_region(&mut self, base: DevNum, count: u32);
}

/// Binding layer routing device numbers to file operations
///
/// `T` is the (usually unsized) operations type a driver publishes.
pub trait IoBinding<T: ?Sized>: Send + Sync {
    /// Bind `ops` to `devnum`
    ///
    /// # Errors
    /// Returns error if `devnum` is already bound
    fn bind(&self, devnum: DevNum, ops: Arc<T>) -> Result<CdevToken>;

    /// Remove a binding. Unbinding never fails.
    fn unbind(&self, token: CdevToken);
}

/// Naming layer publishing device nodes
pub trait Exposure: Send + Sync {
    /// Publish a node called `name` for `devnum`
    ///
    /// # Errors
    /// Returns error if the name or device number is already published
    fn expose(&self, devnum: DevNum, name: &str) -> Result<DeviceToken>;

    /// Withdraw a published node. Withdrawal never fails.
    fn withdraw(&self, token: DeviceToken);
}
