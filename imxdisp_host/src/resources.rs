// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Platform resource discovery for the DCSS display controller.
//!
//! At hardware prepare the OS hands the driver a list of translated memory
//! resources. The DCSS register block is recognized by its physical base;
//! the DPR frame-buffer address register inside it is the bank-switch
//! register, and whatever it holds at that point is the firmware's boot frame
//! buffer address.

use std::fmt;

use imxdisp_core::sink::{BankSwitch, ScanoutRegister};

/// Physical layout of the i.MX 8M DCSS block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct DcssLayout;

impl DcssLayout {
    /// Physical base of the DCSS register block.
    pub const BASE: u64 = 0x32e0_0000;
    /// Length of the DCSS register block.
    pub const LENGTH: u64 = 0x4_0000;
    /// Offset of the DPR sub-block from [`BASE`](Self::BASE).
    pub const DPR_OFFSET: u64 = 0x1_8000;
    /// Offset of the DPR frame-buffer address register from the DPR base.
    pub const FRAME_BUFFER_REGISTER: u64 = 0xc0;
    /// Offset of the frame-buffer address register from
    /// [`BASE`](Self::BASE).
    pub const SCANOUT_REGISTER_OFFSET: u64 = Self::DPR_OFFSET + Self::FRAME_BUFFER_REGISTER;
}

/// One translated memory resource assigned to the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemoryResource {
    /// Physical start address.
    pub start: u64,
    /// Length in bytes.
    pub length: u64,
}

impl MemoryResource {
    /// Whether this resource is the DCSS register block.
    #[must_use]
    pub const fn is_dcss(&self) -> bool {
        self.start == DcssLayout::BASE && self.length >= DcssLayout::LENGTH
    }
}

/// Maps device memory into the driver's address space.
pub trait IoSpace {
    /// Register handle produced by a mapping.
    type Register: ScanoutRegister;

    /// Maps `resource` and returns the 32-bit register at `offset` within it.
    ///
    /// # Errors
    ///
    /// Returns the platform status code if the mapping fails.
    fn map_register(
        &mut self,
        resource: &MemoryResource,
        offset: u64,
    ) -> Result<Self::Register, i32>;

    /// Releases a mapping made by [`map_register`](Self::map_register).
    ///
    /// Every register handle derived from it must already be dropped.
    fn unmap(&mut self, resource: &MemoryResource);
}

/// Mapping the DCSS block failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiscoveryError {
    /// The platform refused to map the block.
    MapFailed {
        /// Physical start of the resource.
        start: u64,
        /// Platform status code.
        code: i32,
    },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MapFailed { start, code } => {
                write!(f, "mapping DCSS block at {start:#x} failed ({code:#x})")
            }
        }
    }
}

impl std::error::Error for DiscoveryError {}

/// A mapped DCSS block and its bank-switch register.
#[derive(Debug)]
pub struct DcssBlock<R> {
    /// The resource that was mapped.
    pub resource: MemoryResource,
    /// Bank-switch register with the firmware baseline captured.
    pub bank_switch: BankSwitch<R>,
}

/// Scans `resources` for the DCSS block and maps its scanout register.
///
/// Returns `Ok(None)` if no DCSS block was assigned; the device then runs
/// without a register target.
///
/// # Errors
///
/// Returns [`DiscoveryError::MapFailed`] if the block is present but cannot
/// be mapped.
pub fn discover<I: IoSpace>(
    resources: &[MemoryResource],
    io: &mut I,
) -> Result<Option<DcssBlock<I::Register>>, DiscoveryError> {
    let Some(resource) = resources.iter().find(|r| r.is_dcss()) else {
        return Ok(None);
    };
    let register = io
        .map_register(resource, DcssLayout::SCANOUT_REGISTER_OFFSET)
        .map_err(|code| DiscoveryError::MapFailed {
            start: resource.start,
            code,
        })?;
    Ok(Some(DcssBlock {
        resource: *resource,
        bank_switch: BankSwitch::capture_baseline(register),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soft::{MemoryRegister, SoftIoSpace};

    const DCSS: MemoryResource = MemoryResource {
        start: DcssLayout::BASE,
        length: DcssLayout::LENGTH,
    };

    #[test]
    fn scanout_register_sits_in_dpr() {
        assert_eq!(DcssLayout::SCANOUT_REGISTER_OFFSET, 0x1_80c0);
    }

    #[test]
    fn dcss_block_is_found_among_other_resources() {
        let mut io = SoftIoSpace::new(MemoryRegister::new(0x9000_0000));
        let resources = [
            MemoryResource {
                start: 0x3000_0000,
                length: 0x1000,
            },
            DCSS,
        ];

        let block = discover(&resources, &mut io).unwrap().expect("DCSS present");

        assert_eq!(block.resource, DCSS);
        assert_eq!(block.bank_switch.baseline(), Some(0x9000_0000));
        assert_eq!(
            io.mapped_offsets(),
            [DcssLayout::SCANOUT_REGISTER_OFFSET],
            "register derived at DPR + 0xc0"
        );
    }

    #[test]
    fn missing_block_is_not_an_error() {
        let mut io = SoftIoSpace::new(MemoryRegister::new(0));
        let resources = [MemoryResource {
            start: DcssLayout::BASE,
            length: 0x100,
        }];
        assert!(discover(&resources, &mut io).unwrap().is_none());
    }

    #[test]
    fn map_failure_is_reported() {
        let mut io = SoftIoSpace::new(MemoryRegister::new(0)).failing(-5);
        let err = discover(&[DCSS], &mut io).unwrap_err();
        assert_eq!(
            err,
            DiscoveryError::MapFailed {
                start: DcssLayout::BASE,
                code: -5,
            }
        );
    }
}
