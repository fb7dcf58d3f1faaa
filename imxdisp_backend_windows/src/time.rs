// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! `QueryPerformanceCounter` host time.

use std::sync::OnceLock;

use imxdisp_core::time::{HostTime, Timebase};
use windows::Win32::System::Performance::{QueryPerformanceCounter, QueryPerformanceFrequency};

/// Returns the QPC [`Timebase`], derived once from the counter frequency.
///
/// Falls back to [`Timebase::NANOS`] if the frequency cannot be read, which
/// does not happen on any supported Windows version.
#[must_use]
pub fn timebase() -> Timebase {
    static TIMEBASE: OnceLock<Timebase> = OnceLock::new();
    *TIMEBASE.get_or_init(|| {
        let mut hz = 0_i64;
        // SAFETY: `hz` is a valid out-pointer for the duration of the call.
        let read = unsafe { QueryPerformanceFrequency(&mut hz) };
        read.ok()
            .and_then(|()| u64::try_from(hz).ok())
            .and_then(Timebase::from_frequency)
            .unwrap_or(Timebase::NANOS)
    })
}

/// Returns the current QPC value as a [`HostTime`].
#[must_use]
pub fn now() -> HostTime {
    let mut count = 0_i64;
    // SAFETY: `count` is a valid out-pointer for the duration of the call.
    // QPC cannot fail on Windows XP and later; a failure leaves it at zero.
    let _ = unsafe { QueryPerformanceCounter(&mut count) };
    HostTime(u64::try_from(count).unwrap_or(0))
}
