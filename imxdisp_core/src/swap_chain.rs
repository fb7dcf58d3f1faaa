// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame source contract.
//!
//! The swap-chain is owned by the OS compositor; the flip loop only consumes
//! it. [`SwapChain`] is the narrow surface the loop needs from it, and
//! [`FrameWait`] is the pair of signals (new frame, terminate) the loop blocks
//! on when no buffer is ready.

use core::fmt;
use core::time::Duration;

use crate::frame::AcquiredBuffer;

/// Identifies one assigned swap-chain.
///
/// Hosts assign ids when a chain is handed to a processor; core code passes
/// them through trace events without interpreting the value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChainId(pub u32);

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId({})", self.0)
    }
}

/// A failed swap-chain call, carrying the status code the producer returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SwapChainError(pub i32);

impl SwapChainError {
    /// `DXGI_ERROR_ACCESS_LOST`: the producer abandoned the chain.
    pub const ACCESS_LOST: Self = Self(0x887A_0026_u32.cast_signed());
    /// `E_FAIL`.
    pub const FAILED: Self = Self(0x8000_4005_u32.cast_signed());
}

impl fmt::Display for SwapChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "swap-chain call failed ({:#010x})", self.0.cast_unsigned())
    }
}

impl core::error::Error for SwapChainError {}

/// Result of a non-blocking buffer request.
#[derive(Debug)]
pub enum Acquired<S> {
    /// A rendered buffer is ready for presentation.
    Buffer(AcquiredBuffer<S>),
    /// No buffer is available yet; wait for the new-frame signal and retry.
    Pending,
}

/// The consumer side of an OS-owned swap-chain.
///
/// Implementations wrap whatever handle the host was given. The flip loop
/// owns the implementation for the lifetime of its worker thread and calls
/// [`destroy`](Self::destroy) exactly once when it stops.
pub trait SwapChain {
    /// Render device the chain must be associated with before acquiring.
    type Device;
    /// Surface type carried by acquired buffers.
    type Surface;

    /// Associates the chain with the device that will consume its surfaces.
    ///
    /// # Errors
    ///
    /// Any error is terminal for this chain.
    fn set_device(&mut self, device: &Self::Device) -> Result<(), SwapChainError>;

    /// Releases the previously acquired buffer and requests the next one
    /// without blocking.
    ///
    /// # Errors
    ///
    /// Errors mean the chain was abandoned (e.g. access lost) and are
    /// terminal.
    fn release_and_acquire(&mut self) -> Result<Acquired<Self::Surface>, SwapChainError>;

    /// Tells the producer the last acquired buffer has been presented.
    ///
    /// # Errors
    ///
    /// Any error is terminal for this chain.
    fn finish_frame(&mut self) -> Result<(), SwapChainError>;

    /// Destroys the chain so the OS can hand out a fresh one if still needed.
    fn destroy(self);
}

/// What woke a [`FrameWait::wait`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WaitOutcome {
    /// The producer signaled a new frame.
    NewFrame,
    /// The poll interval elapsed with no signal.
    TimedOut,
    /// The owner requested termination.
    Terminate,
}

/// The wait primitive itself failed (abandoned handle, poisoned lock, …).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WaitError(pub u32);

impl fmt::Display for WaitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame wait failed ({})", self.0)
    }
}

impl core::error::Error for WaitError {}

/// Blocks until a new frame is signaled, termination is requested, or the
/// timeout elapses.
///
/// When both signals are raised at once, termination wins.
pub trait FrameWait {
    /// Waits up to `timeout` for either signal.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError`] if the underlying primitive fails; the flip loop
    /// treats this as terminal.
    fn wait(&self, timeout: Duration) -> Result<WaitOutcome, WaitError>;

    /// Polls the terminate signal without blocking or consuming a pending
    /// new-frame signal.
    ///
    /// The flip loop checks this before every buffer request so a producer
    /// that never runs dry cannot starve cancellation. Primitives that cannot
    /// poll may keep the default, in which case termination is only seen
    /// from [`wait`](Self::wait).
    fn terminate_requested(&self) -> bool {
        false
    }
}

impl<W: FrameWait + ?Sized> FrameWait for &W {
    fn wait(&self, timeout: Duration) -> Result<WaitOutcome, WaitError> {
        (**self).wait(timeout)
    }

    fn terminate_requested(&self) -> bool {
        (**self).terminate_requested()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn access_lost_formats_as_hresult() {
        assert_eq!(
            SwapChainError::ACCESS_LOST.to_string(),
            "swap-chain call failed (0x887a0026)"
        );
    }

    #[test]
    fn chain_id_debug_is_compact() {
        assert_eq!(alloc::format!("{:?}", ChainId(3)), "ChainId(3)");
    }
}
