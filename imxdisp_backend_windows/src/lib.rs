// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Windows glue for the imxdisp flip loop.
//!
//! The pieces of an indirect display driver that touch Win32 and Direct3D,
//! each implementing one of the core seams:
//!
//! - [`D3d11Stager`]: a CPU-readable D3D11 staging texture
//!   ([`BufferStager`](imxdisp_core::stager::BufferStager))
//! - [`EventPair`]: the OS new-frame event plus a manual-reset terminate
//!   event ([`FrameWait`](imxdisp_core::swap_chain::FrameWait),
//!   [`TerminateSignal`](imxdisp_host::TerminateSignal))
//! - [`MmioRegister`]: a volatile 32-bit register in mapped device memory
//!   ([`ScanoutRegister`](imxdisp_core::sink::ScanoutRegister))
//! - [`now`] / [`timebase`]: `QueryPerformanceCounter` host time
//!
//! On other targets this crate is empty.

#![cfg(windows)]
#![expect(
    unsafe_code,
    reason = "Direct3D, Win32 event, and MMIO access all go through FFI"
)]

mod events;
mod mmio;
mod stager;
mod time;

pub use events::EventPair;
pub use mmio::MmioRegister;
pub use stager::D3d11Stager;
pub use time::{now, timebase};
