// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! New-frame and terminate signals for one swap-chain.
//!
//! [`SwapChainEvents`] pairs an auto-reset "new frame" flag with a sticky
//! "terminate" flag behind one mutex and condition variable. The producer
//! side raises new frames; the owner raises terminate; the flip loop waits on
//! both through [`FrameWait`].

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use imxdisp_core::swap_chain::{FrameWait, WaitError, WaitOutcome};

use crate::processor::TerminateSignal;

/// Status reported when another thread panicked while holding the signal
/// lock.
pub const WAIT_ABANDONED: WaitError = WaitError(0x80);

#[derive(Debug, Default)]
struct Flags {
    new_frame: bool,
    terminate: bool,
}

/// The pair of signals a flip loop blocks on.
#[derive(Debug, Default)]
pub struct SwapChainEvents {
    flags: Mutex<Flags>,
    changed: Condvar,
}

impl SwapChainEvents {
    /// Creates a pair of lowered signals.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the new-frame signal.
    ///
    /// The signal auto-resets when a wait consumes it; raising it several
    /// times before a wait wakes the loop once.
    pub fn signal_new_frame(&self) {
        self.lock().new_frame = true;
        self.changed.notify_all();
    }

    /// Raises the terminate signal. It stays raised.
    pub fn signal_terminate(&self) {
        self.lock().terminate = true;
        self.changed.notify_all();
    }

    /// Whether terminate has been raised.
    #[must_use]
    pub fn is_terminated(&self) -> bool {
        self.lock().terminate
    }

    /// Locks the flags even if a signalling thread panicked; the flags are
    /// plain booleans and stay consistent.
    fn lock(&self) -> MutexGuard<'_, Flags> {
        self.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FrameWait for SwapChainEvents {
    fn wait(&self, timeout: Duration) -> Result<WaitOutcome, WaitError> {
        let deadline = Instant::now() + timeout;
        let mut flags = self.flags.lock().map_err(|_| WAIT_ABANDONED)?;
        loop {
            if flags.terminate {
                return Ok(WaitOutcome::Terminate);
            }
            if flags.new_frame {
                flags.new_frame = false;
                return Ok(WaitOutcome::NewFrame);
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(WaitOutcome::TimedOut);
            }
            flags = self
                .changed
                .wait_timeout(flags, remaining)
                .map_err(|_| WAIT_ABANDONED)?
                .0;
        }
    }

    fn terminate_requested(&self) -> bool {
        self.is_terminated()
    }
}

impl TerminateSignal for SwapChainEvents {
    fn raise_terminate(&self) {
        self.signal_terminate();
    }
}
