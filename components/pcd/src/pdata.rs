//! Per-device platform data

use crate::perm::Permission;

/// Configuration delivered with a platform device
///
/// Carried as opaque platform data on a `PlatformDevice` and read back in
/// probe; the static driver takes a table of these directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcdevPlatformData {
    /// Buffer size in bytes
    pub size: usize,
    pub perm: Permission,
    pub serial_number: String,
}

impl PcdevPlatformData {
    pub fn new(size: usize, perm: Permission, serial_number: &str) -> Self {
        Self {
            size,
            perm,
            serial_number: serial_number.to_string(),
        }
    }
}
