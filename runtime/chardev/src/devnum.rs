//! Device Numbers - major:minor encoding
//!
//! A device number packs a 12-bit major and a 20-bit minor into 32 bits,
//! the same split the Linux `dev_t` uses internally.

use core::fmt;
use core::ops::Add;

use static_assertions::const_assert;

/// Number of bits reserved for the minor part
pub const MINORBITS: u32 = 20;

/// Mask selecting the minor part
pub const MINORMASK: u32 = (1 << MINORBITS) - 1;

const_assert!(MINORBITS < u32::BITS);

/// Opaque device handle (major:minor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DevNum(u32);

impl DevNum {
    /// Build a device number from its parts (`MKDEV`)
    pub const fn new(major: u32, minor: u32) -> Self {
        Self((major << MINORBITS) | (minor & MINORMASK))
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn major(self) -> u32 {
        self.0 >> MINORBITS
    }

    pub const fn minor(self) -> u32 {
        self.0 & MINORMASK
    }

    /// Offset the minor by `n`, failing if it would leave the minor space
    pub fn checked_add(self, n: u32) -> Option<Self> {
        let minor = self.minor().checked_add(n)?;
        if minor > MINORMASK {
            return None;
        }
        Some(Self::new(self.major(), minor))
    }

    /// Distance of `self` from `base` when both share a major
    pub fn ordinal_from(self, base: DevNum) -> Option<u32> {
        if self.major() != base.major() {
            return None;
        }
        self.minor().checked_sub(base.minor())
    }
}

impl Add<u32> for DevNum {
    type Output = DevNum;

    /// `base + i`, wrapping inside the minor space
    fn add(self, rhs: u32) -> DevNum {
        DevNum::new(self.major(), self.minor().wrapping_add(rhs))
    }
}

impl fmt::Display for DevNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major(), self.minor())
    }
}
