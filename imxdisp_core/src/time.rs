// Copyright 2026 the imxdisp Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Monotonic host time and timebase conversion.
//!
//! [`HostTime`] is a point in time in platform-native monotonic ticks
//! (`CLOCK_MONOTONIC` nanoseconds on the host crate, `QueryPerformanceCounter`
//! counts on the Windows backend). [`Timebase`] carries the rational
//! ticks → nanoseconds factor, and [`Duration`] a span in the same ticks.
//!
//! The flip loop only ever subtracts timestamps taken from one clock, so all
//! arithmetic here saturates rather than panics.

use core::fmt;

/// A point in time expressed as platform-native monotonic ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HostTime(pub u64);

impl HostTime {
    /// Returns the raw tick value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Converts this host time to nanoseconds using the given timebase.
    #[inline]
    #[must_use]
    pub const fn to_nanos(self, timebase: Timebase) -> u64 {
        timebase.ticks_to_nanos(self.0)
    }

    /// Returns the duration between `self` and an earlier time, or zero if
    /// `earlier` is after `self`.
    #[inline]
    #[must_use]
    pub const fn saturating_duration_since(self, earlier: Self) -> Duration {
        Duration(self.0.saturating_sub(earlier.0))
    }
}

impl fmt::Debug for HostTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostTime({})", self.0)
    }
}

/// Rational conversion factor from ticks to nanoseconds.
///
/// `nanoseconds = ticks * numer / denom`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timebase {
    /// Numerator of the ticks-to-nanoseconds ratio.
    pub numer: u32,
    /// Denominator of the ticks-to-nanoseconds ratio.
    pub denom: u32,
}

impl Timebase {
    /// A timebase where ticks are already nanoseconds (1:1).
    pub const NANOS: Self = Self { numer: 1, denom: 1 };

    /// Creates a new timebase with the given numerator and denominator.
    ///
    /// # Panics
    ///
    /// Panics if `denom` is zero.
    #[inline]
    #[must_use]
    pub const fn new(numer: u32, denom: u32) -> Self {
        assert!(denom != 0, "timebase denominator must not be zero");
        Self { numer, denom }
    }

    /// Builds a timebase for a counter running at `hz` ticks per second.
    ///
    /// Performance counters report their frequency in hertz; the ratio
    /// `1e9 / hz` is reduced so both terms fit in `u32`. Returns `None` for a
    /// zero or unrepresentable frequency.
    #[must_use]
    pub fn from_frequency(hz: u64) -> Option<Self> {
        if hz == 0 {
            return None;
        }
        let divisor = gcd(1_000_000_000, hz);
        let numer = u32::try_from(1_000_000_000 / divisor).ok()?;
        let denom = u32::try_from(hz / divisor).ok()?;
        Some(Self { numer, denom })
    }

    /// Converts a tick count to nanoseconds.
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "u128 intermediate avoids overflow; truncation back to u64 is intentional"
    )]
    pub const fn ticks_to_nanos(self, ticks: u64) -> u64 {
        let wide = ticks as u128 * self.numer as u128 / self.denom as u128;
        wide as u64
    }

    /// Converts nanoseconds to a tick count.
    #[inline]
    #[must_use]
    #[expect(
        clippy::cast_possible_truncation,
        reason = "u128 intermediate avoids overflow; truncation back to u64 is intentional"
    )]
    pub const fn nanos_to_ticks(self, nanos: u64) -> u64 {
        let wide = nanos as u128 * self.denom as u128 / self.numer as u128;
        wide as u64
    }
}

impl fmt::Debug for Timebase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timebase({}/{})", self.numer, self.denom)
    }
}

const fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// A duration in platform-native ticks.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(pub u64);

impl Duration {
    /// A zero-length duration.
    pub const ZERO: Self = Self(0);

    /// Returns the raw tick value.
    #[inline]
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Converts this duration to nanoseconds using the given timebase.
    #[inline]
    #[must_use]
    pub const fn to_nanos(self, timebase: Timebase) -> u64 {
        timebase.ticks_to_nanos(self.0)
    }

    /// Saturating addition.
    #[inline]
    #[must_use]
    pub const fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl fmt::Debug for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Duration({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_timebase_is_nanoseconds() {
        let t = HostTime(16_666_667);
        assert_eq!(t.to_nanos(Timebase::NANOS), 16_666_667, "identity timebase");
    }

    #[test]
    fn qpc_frequency_reduces_to_small_ratio() {
        // The common QueryPerformanceFrequency value on Windows 10+.
        let tb = Timebase::from_frequency(10_000_000).unwrap();
        assert_eq!(tb, Timebase::new(100, 1), "10 MHz counter ticks are 100ns");
        assert_eq!(tb.ticks_to_nanos(160_000), 16_000_000, "16ms of ticks");
        assert_eq!(tb.nanos_to_ticks(16_000_000), 160_000, "inverse");
    }

    #[test]
    fn odd_frequency_keeps_exact_ratio() {
        // 24 MHz timer clock, as exposed by the i.MX 8M system counter.
        let tb = Timebase::from_frequency(24_000_000).unwrap();
        assert_eq!(tb, Timebase::new(125, 3), "24 MHz reduces to 125/3");
        assert_eq!(tb.ticks_to_nanos(24_000_000), 1_000_000_000, "one second");
    }

    #[test]
    fn zero_frequency_is_rejected() {
        assert_eq!(Timebase::from_frequency(0), None, "no timebase for 0 Hz");
    }

    #[test]
    fn saturating_ops_never_panic() {
        let t = HostTime(1000);
        assert_eq!(t.saturating_duration_since(HostTime(1500)), Duration::ZERO);
        assert_eq!(t.saturating_duration_since(HostTime(400)), Duration(600));
        assert_eq!(
            Duration(u64::MAX).saturating_add(Duration(1)),
            Duration(u64::MAX),
            "saturates at u64::MAX"
        );
    }
}
