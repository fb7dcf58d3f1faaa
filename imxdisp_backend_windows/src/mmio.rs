// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Volatile access to a mapped 32-bit device register.

use core::ptr::NonNull;

use imxdisp_core::sink::ScanoutRegister;

/// A 32-bit register in mapped device memory.
///
/// Every read and write is a single volatile access, so the compiler neither
/// elides nor merges them.
#[derive(Debug)]
pub struct MmioRegister {
    ptr: NonNull<u32>,
}

// SAFETY: the register is a plain device word; concurrent volatile accesses
// are what the hardware sees anyway.
unsafe impl Send for MmioRegister {}
// SAFETY: as above.
unsafe impl Sync for MmioRegister {}

impl MmioRegister {
    /// Wraps a mapped register.
    ///
    /// # Safety
    ///
    /// `ptr` must be 4-byte aligned and point into device memory that stays
    /// mapped for the lifetime of the returned value.
    #[must_use]
    pub const unsafe fn new(ptr: NonNull<u32>) -> Self {
        Self { ptr }
    }

    /// Address of the register in the driver's address space.
    #[must_use]
    pub fn as_ptr(&self) -> *mut u32 {
        self.ptr.as_ptr()
    }
}

impl ScanoutRegister for MmioRegister {
    fn read(&self) -> u32 {
        // SAFETY: `new` requires a valid, aligned, mapped register.
        unsafe { self.ptr.as_ptr().read_volatile() }
    }

    fn write(&self, address: u32) {
        // SAFETY: `new` requires a valid, aligned, mapped register.
        unsafe { self.ptr.as_ptr().write_volatile(address) }
    }
}
