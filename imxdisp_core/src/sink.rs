// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Display sink resources: the bank-switch register and the linear buffer.
//!
//! Both are shared with the display controller and firmware. Register
//! accesses are single 32-bit words and rely on the hardware to serialize
//! them; no software lock is taken. The linear buffer receives whole frames
//! only.

use core::convert::Infallible;

/// A memory-mapped register holding the physical address the display
/// controller scans out from.
///
/// Writes must be a single volatile 32-bit store.
pub trait ScanoutRegister {
    /// Reads the current scanout address.
    fn read(&self) -> u32;

    /// Points scanout at `address`.
    fn write(&self, address: u32);
}

impl<R: ScanoutRegister + ?Sized> ScanoutRegister for &R {
    fn read(&self) -> u32 {
        (**self).read()
    }

    fn write(&self, address: u32) {
        (**self).write(address);
    }
}

/// A CPU-writable pixel buffer the display controller scans out from.
pub trait LinearBuffer {
    /// Size of the buffer in bytes.
    fn capacity(&self) -> usize;

    /// Copies `frame` to the start of the buffer.
    ///
    /// Callers guarantee `frame.len() <= self.capacity()`.
    fn write_frame(&mut self, frame: &[u8]);
}

impl ScanoutRegister for Infallible {
    fn read(&self) -> u32 {
        match *self {}
    }

    fn write(&self, _: u32) {
        match *self {}
    }
}

impl LinearBuffer for Infallible {
    fn capacity(&self) -> usize {
        match *self {}
    }

    fn write_frame(&mut self, _: &[u8]) {
        match *self {}
    }
}

/// The bank-switch register plus the firmware's scanout address, if known.
#[derive(Debug)]
pub struct BankSwitch<R> {
    register: R,
    baseline: Option<u32>,
}

impl<R: ScanoutRegister> BankSwitch<R> {
    /// Wraps a register and records its current value as the baseline.
    ///
    /// At driver start the register still holds the address of the boot
    /// frame buffer the firmware set up.
    #[must_use]
    pub fn capture_baseline(register: R) -> Self {
        let current = register.read();
        Self {
            register,
            baseline: (current != 0).then_some(current),
        }
    }

    /// Wraps a register with an explicitly known baseline (or none).
    #[must_use]
    pub fn with_baseline(register: R, baseline: Option<u32>) -> Self {
        Self { register, baseline }
    }

    /// The firmware scanout address, if known.
    #[inline]
    #[must_use]
    pub fn baseline(&self) -> Option<u32> {
        self.baseline
    }

    /// The wrapped register.
    #[inline]
    #[must_use]
    pub fn register(&self) -> &R {
        &self.register
    }
}

/// Which target a sink was configured with at initialization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DisplayTarget {
    /// A bank-switch register was discovered; direct scanout is possible.
    RegisterBacked,
    /// Only a linear frame buffer is available; every frame is copied.
    LinearBuffer,
    /// Nothing usable was discovered; frames are dropped.
    Unavailable,
}

/// The destination of presented frames.
///
/// The set of resources is fixed at construction and never changes.
#[derive(Debug)]
pub struct DisplaySink<R, L> {
    pub(crate) bank_switch: Option<BankSwitch<R>>,
    pub(crate) linear: Option<L>,
}

impl<R: ScanoutRegister, L: LinearBuffer> DisplaySink<R, L> {
    /// Creates a sink from whatever resources were discovered.
    #[must_use]
    pub fn new(bank_switch: Option<BankSwitch<R>>, linear: Option<L>) -> Self {
        Self {
            bank_switch,
            linear,
        }
    }

    /// The primary target selected for this sink.
    #[must_use]
    pub fn target(&self) -> DisplayTarget {
        match (&self.bank_switch, &self.linear) {
            (Some(_), _) => DisplayTarget::RegisterBacked,
            (None, Some(_)) => DisplayTarget::LinearBuffer,
            (None, None) => DisplayTarget::Unavailable,
        }
    }

    /// The bank-switch register, if configured.
    #[must_use]
    pub fn bank_switch(&self) -> Option<&BankSwitch<R>> {
        self.bank_switch.as_ref()
    }

    /// The linear buffer, if configured.
    #[must_use]
    pub fn linear(&self) -> Option<&L> {
        self.linear.as_ref()
    }
}

impl DisplaySink<Infallible, Infallible> {
    /// A sink with no resources; every frame is dropped.
    #[must_use]
    pub const fn unavailable() -> Self {
        Self {
            bank_switch: None,
            linear: None,
        }
    }
}
