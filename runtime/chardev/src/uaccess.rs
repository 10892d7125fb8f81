//! User Access - copies across the user/kernel trust boundary
//!
//! Driver read/write paths never touch caller memory directly. They go
//! through [`UserWrite::copy_to_user`] and [`UserRead::copy_from_user`],
//! which may fault part-way when the caller's region is not fully mapped.
//! A fault reports how many bytes were transferred before it hit.
//!
//! [`UserBuffer`] models a caller region with an optional unmapped tail, so
//! fault paths can be driven deterministically.

use alloc::vec;
use alloc::vec::Vec;

use thiserror::Error;

/// A copy hit unmapped caller memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("user copy faulted after {copied} bytes")]
pub struct UserFault {
    /// Bytes transferred before the fault
    pub copied: usize,
}

/// Caller-owned destination of a read
pub trait UserWrite {
    /// Copy all of `src` into the caller region
    ///
    /// # Errors
    /// Returns [`UserFault`] if the region cannot hold `src`; a prefix may
    /// already have been written
    fn copy_to_user(&mut self, src: &[u8]) -> Result<(), UserFault>;
}

/// Caller-owned source of a write
pub trait UserRead {
    /// Fill all of `dst` from the caller region
    ///
    /// # Errors
    /// Returns [`UserFault`] if the region holds fewer than `dst.len()`
    /// readable bytes; a prefix of `dst` may already have been filled
    fn copy_from_user(&self, dst: &mut [u8]) -> Result<(), UserFault>;
}

/// Simulated caller memory with a mapped prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserBuffer {
    data: Vec<u8>,
    mapped: usize,
}

impl UserBuffer {
    /// Zeroed, fully mapped region of `len` bytes
    pub fn new(len: usize) -> Self {
        Self {
            data: vec![0; len],
            mapped: len,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self {
            data: bytes.to_vec(),
            mapped: bytes.len(),
        }
    }

    /// Unmap everything from `offset` onward
    pub fn with_fault_at(mut self, offset: usize) -> Self {
        self.mapped = offset.min(self.data.len());
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes accessible before the fault boundary
    pub fn mapped_len(&self) -> usize {
        self.mapped
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl UserWrite for UserBuffer {
    fn copy_to_user(&mut self, src: &[u8]) -> Result<(), UserFault> {
        copy_into(&mut self.data[..self.mapped], src)
    }
}

impl UserRead for UserBuffer {
    fn copy_from_user(&self, dst: &mut [u8]) -> Result<(), UserFault> {
        copy_out(&self.data[..self.mapped], dst)
    }
}

impl UserWrite for Vec<u8> {
    fn copy_to_user(&mut self, src: &[u8]) -> Result<(), UserFault> {
        copy_into(self.as_mut_slice(), src)
    }
}

impl UserRead for Vec<u8> {
    fn copy_from_user(&self, dst: &mut [u8]) -> Result<(), UserFault> {
        copy_out(self.as_slice(), dst)
    }
}

impl<const N: usize> UserWrite for [u8; N] {
    fn copy_to_user(&mut self, src: &[u8]) -> Result<(), UserFault> {
        copy_into(self.as_mut_slice(), src)
    }
}

impl<const N: usize> UserRead for [u8; N] {
    fn copy_from_user(&self, dst: &mut [u8]) -> Result<(), UserFault> {
        copy_out(self.as_slice(), dst)
    }
}

fn copy_into(region: &mut [u8], src: &[u8]) -> Result<(), UserFault> {
    let n = src.len().min(region.len());
    region[..n].copy_from_slice(&src[..n]);
    if n < src.len() {
        return Err(UserFault { copied: n });
    }
    Ok(())
}

fn copy_out(region: &[u8], dst: &mut [u8]) -> Result<(), UserFault> {
    let n = dst.len().min(region.len());
    dst[..n].copy_from_slice(&region[..n]);
    if n < dst.len() {
        return Err(UserFault { copied: n });
    }
    Ok(())
}
