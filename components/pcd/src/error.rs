//! Driver error types

use pcd_chardev::{ChardevError, DevNum, Errno};
use thiserror::Error;

use crate::perm::Access;

/// Pseudo character device error types
#[derive(Debug, Error)]
pub enum PcdError {
    #[error("No such device: {devnum}")]
    NotFound { devnum: DevNum },

    #[error("No device node named {name:?}")]
    UnknownNode { name: String },

    #[error("Device {devnum}: {access} permission denied")]
    PermissionDenied { devnum: DevNum, access: Access },

    #[error("Invalid seek target {target}")]
    InvalidOffset { target: i128 },

    #[error("Invalid whence value {whence}")]
    InvalidWhence { whence: i32 },

    #[error("Device {devnum}: no space left to write")]
    OutOfSpace { devnum: DevNum },

    #[error("User copy faulted after {copied} bytes")]
    FaultBoundary { copied: usize },

    #[error("Device {id}: no platform data")]
    MissingConfig { id: u32 },

    #[error("Device {id}: invalid platform data: {reason}")]
    InvalidConfig { id: u32, reason: String },

    #[error("Failed to allocate {size} byte device buffer")]
    AllocationFailed { size: usize },

    #[error("Failed to add cdev: {0}")]
    BindingFailed(#[source] ChardevError),

    #[error("Failed to create device node: {0}")]
    ExposureFailed(#[source] ChardevError),

    #[error("Device registry exhausted ({max} devices)")]
    Exhausted { max: u32 },

    #[error("Device {devnum} is busy")]
    Busy { devnum: DevNum },

    #[error("Failed to allocate device numbers: {0}")]
    Region(#[source] ChardevError),
}

impl PcdError {
    /// Errno a kernel entry point would return for this error
    pub fn errno(&self) -> Errno {
        match self {
            PcdError::NotFound { .. } | PcdError::UnknownNode { .. } => Errno::ENODEV,
            PcdError::PermissionDenied { .. } => Errno::EPERM,
            PcdError::InvalidOffset { .. }
            | PcdError::InvalidWhence { .. }
            | PcdError::MissingConfig { .. }
            | PcdError::InvalidConfig { .. } => Errno::EINVAL,
            // A full device reports ENOMEM, not ENOSPC
            PcdError::OutOfSpace { .. } | PcdError::AllocationFailed { .. } => Errno::ENOMEM,
            PcdError::FaultBoundary { .. } => Errno::EFAULT,
            PcdError::BindingFailed(_) | PcdError::ExposureFailed(_) | PcdError::Busy { .. } => {
                Errno::EBUSY
            }
            PcdError::Exhausted { .. } => Errno::ENOSPC,
            PcdError::Region(err) => err.errno(),
        }
    }
}

pub type Result<T> = core::result::Result<T, PcdError>;
