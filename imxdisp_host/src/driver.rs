// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Process-wide driver object slot.
//!
//! The OS loads a driver once and later unloads it once. Callbacks that only
//! receive a device need to reach the driver object, so it is parked in a
//! static [`DriverSlot`] between those two points. A slot is good for one
//! load: once unregistered it stays empty for the life of the process.

use core::num::NonZeroUsize;
use core::sync::atomic::{AtomicUsize, Ordering};
use std::fmt;

/// Misuse of a [`DriverSlot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DriverSlotError {
    /// A driver object is already registered.
    AlreadyRegistered,
    /// No driver object is registered.
    NotRegistered,
    /// The slot was already used and emptied by an unload.
    Unloaded,
}

impl fmt::Display for DriverSlotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered => f.write_str("driver object already registered"),
            Self::NotRegistered => f.write_str("no driver object registered"),
            Self::Unloaded => f.write_str("driver already unloaded"),
        }
    }
}

impl std::error::Error for DriverSlotError {}

/// Holds an opaque driver object handle between load and unload.
///
/// The handle is set at most once and cleared at most once. `usize::MAX` is
/// reserved and cannot be registered.
///
/// ```
/// use core::num::NonZeroUsize;
/// use imxdisp_host::DriverSlot;
///
/// static DRIVER: DriverSlot = DriverSlot::new();
///
/// let handle = NonZeroUsize::new(0x1000).unwrap();
/// DRIVER.register(handle).unwrap();
/// assert_eq!(DRIVER.get(), Some(handle));
/// assert_eq!(DRIVER.unregister(), Ok(handle));
/// assert!(DRIVER.register(handle).is_err());
/// ```
#[derive(Debug, Default)]
pub struct DriverSlot {
    handle: AtomicUsize,
}

/// Stored after unregister.
const UNLOADED: usize = usize::MAX;

impl DriverSlot {
    /// An empty slot.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            handle: AtomicUsize::new(0),
        }
    }

    /// Stores `handle`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverSlotError::AlreadyRegistered`] if a handle is stored
    /// (or `handle` is the reserved value), and [`DriverSlotError::Unloaded`]
    /// if the slot has been emptied by [`unregister`](Self::unregister).
    pub fn register(&self, handle: NonZeroUsize) -> Result<(), DriverSlotError> {
        if handle.get() == UNLOADED {
            return Err(DriverSlotError::AlreadyRegistered);
        }
        match self
            .handle
            .compare_exchange(0, handle.get(), Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => Ok(()),
            Err(UNLOADED) => Err(DriverSlotError::Unloaded),
            Err(_) => Err(DriverSlotError::AlreadyRegistered),
        }
    }

    /// Clears the slot and returns the stored handle.
    ///
    /// # Errors
    ///
    /// Returns [`DriverSlotError::NotRegistered`] if nothing was ever
    /// registered, and [`DriverSlotError::Unloaded`] if the handle was
    /// already cleared.
    pub fn unregister(&self) -> Result<NonZeroUsize, DriverSlotError> {
        let previous = self
            .handle
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |h| {
                (h != 0 && h != UNLOADED).then_some(UNLOADED)
            });
        match previous {
            Ok(h) => NonZeroUsize::new(h).ok_or(DriverSlotError::NotRegistered),
            Err(UNLOADED) => Err(DriverSlotError::Unloaded),
            Err(_) => Err(DriverSlotError::NotRegistered),
        }
    }

    /// The stored handle, if any.
    #[must_use]
    pub fn get(&self) -> Option<NonZeroUsize> {
        match self.handle.load(Ordering::Acquire) {
            UNLOADED => None,
            h => NonZeroUsize::new(h),
        }
    }
}
