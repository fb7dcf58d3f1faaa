// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Win32 event pair for the flip loop.
//!
//! The OS hands each swap-chain an auto-reset "new frame" event. The driver
//! adds its own terminate event, created manual-reset so that once raised it
//! stays raised for every later wait and poll.

use std::time::Duration;

use imxdisp_core::swap_chain::{FrameWait, WaitError, WaitOutcome};
use imxdisp_host::TerminateSignal;
use windows::Win32::Foundation::{CloseHandle, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT};
use windows::Win32::System::Threading::{
    CreateEventW, SetEvent, WaitForMultipleObjects, WaitForSingleObject,
};
use windows_core::PCWSTR;

/// The new-frame event of one swap-chain plus an owned terminate event.
#[derive(Debug)]
pub struct EventPair {
    new_frame: HANDLE,
    terminate: HANDLE,
}

// SAFETY: Win32 event handles may be waited on and signaled from any thread.
unsafe impl Send for EventPair {}
// SAFETY: as above; every operation on the handles is itself thread-safe.
unsafe impl Sync for EventPair {}

impl EventPair {
    /// Pairs the OS new-frame event with a fresh terminate event.
    ///
    /// # Errors
    ///
    /// Returns the Win32 error if the terminate event cannot be created.
    ///
    /// # Safety
    ///
    /// `new_frame` must be a valid event handle that stays open for the
    /// lifetime of the pair. The pair does not close it.
    pub unsafe fn new(new_frame: HANDLE) -> windows_core::Result<Self> {
        // SAFETY: default security and no name are valid arguments.
        let terminate = unsafe { CreateEventW(None, true, false, PCWSTR::null()) }?;
        Ok(Self {
            new_frame,
            terminate,
        })
    }

    /// Raises the terminate event. It stays raised.
    pub fn signal_terminate(&self) {
        // SAFETY: `terminate` is owned by `self` and open until drop. SetEvent
        // only fails for invalid handles.
        let _ = unsafe { SetEvent(self.terminate) };
    }
}

impl FrameWait for EventPair {
    fn wait(&self, timeout: Duration) -> Result<WaitOutcome, WaitError> {
        // u32::MAX is INFINITE; clamp below it.
        let millis = u32::try_from(timeout.as_millis())
            .unwrap_or(u32::MAX)
            .min(u32::MAX - 1);
        // Terminate comes first so it wins when both are signaled.
        let handles = [self.terminate, self.new_frame];
        // SAFETY: both handles are open for the lifetime of `self`.
        let result = unsafe { WaitForMultipleObjects(&handles, false, millis) };
        if result == WAIT_OBJECT_0 {
            Ok(WaitOutcome::Terminate)
        } else if result.0 == WAIT_OBJECT_0.0 + 1 {
            Ok(WaitOutcome::NewFrame)
        } else if result == WAIT_TIMEOUT {
            Ok(WaitOutcome::TimedOut)
        } else {
            Err(WaitError(result.0))
        }
    }

    fn terminate_requested(&self) -> bool {
        // SAFETY: `terminate` is open; a zero timeout only polls, and polling
        // a manual-reset event does not reset it.
        unsafe { WaitForSingleObject(self.terminate, 0) == WAIT_OBJECT_0 }
    }
}

impl TerminateSignal for EventPair {
    fn raise_terminate(&self) {
        self.signal_terminate();
    }
}

impl Drop for EventPair {
    fn drop(&mut self) {
        // SAFETY: `terminate` was created by `new` and is closed only here.
        let _ = unsafe { CloseHandle(self.terminate) };
    }
}
