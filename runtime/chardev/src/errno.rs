//! Kernel error numbers
//!
//! Drivers report failures to the bus as errno values; the richer error
//! enums of each crate map down to these.

use core::fmt;

/// Positive errno code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(i32);

impl Errno {
    pub const EPERM: Errno = Errno(1);
    pub const ENOMEM: Errno = Errno(12);
    pub const EFAULT: Errno = Errno(14);
    pub const EBUSY: Errno = Errno(16);
    pub const ENODEV: Errno = Errno(19);
    pub const EINVAL: Errno = Errno(22);
    pub const ENOSPC: Errno = Errno(28);

    pub const fn code(self) -> i32 {
        self.0
    }

    /// Negative return value as a kernel entry point would report it
    pub const fn to_kernel(self) -> i32 {
        -self.0
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            1 => "EPERM",
            12 => "ENOMEM",
            14 => "EFAULT",
            16 => "EBUSY",
            19 => "ENODEV",
            22 => "EINVAL",
            28 => "ENOSPC",
            _ => "EUNKNOWN",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}
