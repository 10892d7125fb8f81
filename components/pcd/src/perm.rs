//! Device permission mask

use core::fmt;
use core::str::FromStr;

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Access allowed on a device (platform-data encoding)
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permission: u8 {
        const READ  = 0x01;
        const WRITE = 0x10;
    }
}

impl Permission {
    pub const RDONLY: Permission = Permission::READ;
    pub const WRONLY: Permission = Permission::WRITE;
    pub const RDWR: Permission = Permission::READ.union(Permission::WRITE);

    pub fn can_read(self) -> bool {
        self.contains(Permission::READ)
    }

    pub fn can_write(self) -> bool {
        self.contains(Permission::WRITE)
    }

    pub fn allows(self, access: Access) -> bool {
        match access {
            Access::Read => self.can_read(),
            Access::Write => self.can_write(),
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match (self.can_read(), self.can_write()) {
            (true, true) => "RDWR",
            (true, false) => "RDONLY",
            (false, true) => "WRONLY",
            (false, false) => "NONE",
        };
        write!(f, "{} (0x{:x})", name, self.bits())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid permission {0:?} (expected rdonly, wronly, rdwr or a 0x01/0x10 mask)")]
pub struct ParsePermissionError(pub String);

impl FromStr for Permission {
    type Err = ParsePermissionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "rdonly" => return Ok(Permission::RDONLY),
            "wronly" => return Ok(Permission::WRONLY),
            "rdwr" => return Ok(Permission::RDWR),
            _ => {}
        }

        let bits = match lower.strip_prefix("0x") {
            Some(hex) => u8::from_str_radix(hex, 16),
            None => lower.parse::<u8>(),
        }
        .map_err(|_| ParsePermissionError(s.to_string()))?;

        Permission::from_bits(bits).ok_or_else(|| ParsePermissionError(s.to_string()))
    }
}

/// Kind of data access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Read => f.write_str("read"),
            Access::Write => f.write_str("write"),
        }
    }
}
