// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Threaded host for the imxdisp flip loop.
//!
//! This crate wraps [`imxdisp_core`] in the pieces a display driver process
//! needs around it:
//!
//! - [`DeviceContext`]: per-adapter hardware prepare/release, mode commit, and
//!   swap-chain assignment
//! - [`SwapChainProcessor`]: one named worker thread per swap-chain, stopped
//!   by raising terminate and joining
//! - [`SwapChainEvents`]: a condvar-backed new-frame / terminate signal pair
//! - [`discover`]: DCSS register block discovery from platform resources
//! - [`DriverSlot`]: the process-wide driver object
//! - [`soft`]: a CPU-only device for tests and demos

mod context;
mod driver;
mod events;
mod processor;
mod resources;
mod time;

pub mod soft;

pub use context::{AssignError, BootFrameBuffer, DeviceContext, DeviceFactory};
pub use driver::{DriverSlot, DriverSlotError};
pub use events::{SwapChainEvents, WAIT_ABANDONED};
pub use processor::{
    ProcessorConfig, ProcessorError, ProcessorExit, SpawnFailure, SwapChainProcessor,
    TerminateSignal,
};
pub use resources::{DcssBlock, DcssLayout, DiscoveryError, IoSpace, MemoryResource, discover};
pub use time::{now, timebase};
