// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Host clock for flip-loop timestamps.
//!
//! On unix this reads `CLOCK_MONOTONIC`. Elsewhere ticks are nanoseconds since
//! the first call, taken from [`std::time::Instant`]. Either way the
//! [`timebase`] is nanoseconds.

use imxdisp_core::time::{HostTime, Timebase};

/// Returns the host [`Timebase`]: ticks are nanoseconds.
#[must_use]
pub const fn timebase() -> Timebase {
    Timebase::NANOS
}

/// Returns the current monotonic host time in nanoseconds.
#[must_use]
pub fn now() -> HostTime {
    imp::now()
}

#[cfg(unix)]
mod imp {
    use imxdisp_core::time::HostTime;
    use rustix::time::{ClockId, Timespec, clock_gettime};

    const NANOS_PER_SECOND: u128 = 1_000_000_000;

    pub(super) fn now() -> HostTime {
        timespec_to_host_time(clock_gettime(ClockId::Monotonic))
    }

    pub(super) fn timespec_to_host_time(timespec: Timespec) -> HostTime {
        let seconds = u64::try_from(timespec.tv_sec).unwrap_or(0);
        let nanos = u64::try_from(timespec.tv_nsec)
            .unwrap_or(0)
            .min(999_999_999);

        let ticks = u128::from(seconds)
            .saturating_mul(NANOS_PER_SECOND)
            .saturating_add(u128::from(nanos));
        HostTime(u64::try_from(ticks).unwrap_or(u64::MAX))
    }
}

#[cfg(not(unix))]
mod imp {
    use std::sync::OnceLock;
    use std::time::Instant;

    use imxdisp_core::time::HostTime;

    static EPOCH: OnceLock<Instant> = OnceLock::new();

    pub(super) fn now() -> HostTime {
        let epoch = *EPOCH.get_or_init(Instant::now);
        HostTime(u64::try_from(epoch.elapsed().as_nanos()).unwrap_or(u64::MAX))
    }
}
