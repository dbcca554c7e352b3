// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Time datatypes for the probe controller
//!
//! The controller never reads a clock: every event carries its own
//! `at_time`, and the caller guarantees the supplied values are
//! non-decreasing. `Timestamp` only requires that all values handed to a
//! single controller are measured from the same epoch.

use core::{fmt, num::NonZeroU64, time::Duration};

/// An absolute point in time, measured from a caller-defined epoch.
///
/// The absolute value should be treated as opaque; it is not related to any
/// calendar time. Timestamps are only comparable if they are sourced from
/// the same epoch.
///
/// The internal representation is microseconds, so the layout is consistent
/// across platforms and a timestamp stays cheap to copy and compare.
#[derive(PartialEq, Eq, PartialOrd, Ord, Copy, Clone, Hash)]
pub struct Timestamp(NonZeroU64);

/// A prechecked 1us value
const ONE_MICROSECOND: NonZeroU64 = NonZeroU64::new(1).unwrap();

impl Timestamp {
    /// Creates a `Timestamp` the given `Duration` after the epoch.
    ///
    /// A zero duration is rounded up to 1us after the epoch so the epoch
    /// itself stays representable.
    #[inline]
    pub fn from_duration(duration: Duration) -> Self {
        // 2^64 microseconds is ~580,000 years so casting from a u128 is ok
        debug_assert!(duration.as_micros() <= u64::MAX.into());
        let micros = duration.as_micros() as u64;
        let micros = NonZeroU64::new(micros).unwrap_or(ONE_MICROSECOND);
        Self(micros)
    }

    /// Creates a `Timestamp` the given number of milliseconds after the epoch.
    #[inline]
    pub fn from_millis(millis: u64) -> Self {
        Self::from_duration(Duration::from_millis(millis))
    }

    /// Returns the timestamp as a [`Duration`] since the epoch.
    #[inline]
    pub const fn as_duration(self) -> Duration {
        Duration::from_micros(self.0.get())
    }

    /// Tries to calculate a `Timestamp` based on the current `Timestamp`
    /// and adding the provided `Duration`. If the result is representable
    /// it is returned as `Some(timestamp)`, otherwise `None` is returned.
    #[inline]
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        self.as_duration()
            .checked_add(duration)
            .filter(|total| total.as_micros() <= u64::MAX.into())
            .map(Self::from_duration)
    }

    /// Tries to calculate a `Timestamp` based on the current `Timestamp`
    /// and subtracting the provided `Duration`. If the result is
    /// representable it is returned as `Some(timestamp)`, otherwise `None`
    /// is returned.
    #[inline]
    pub fn checked_sub(self, duration: Duration) -> Option<Self> {
        self.as_duration()
            .checked_sub(duration)
            .map(Self::from_duration)
    }

    /// Returns the `Duration` which elapsed since an earlier `Timestamp`.
    /// If `earlier` is more recent, the method returns a `Duration` of 0.
    #[inline]
    pub fn saturating_duration_since(self, earlier: Self) -> Duration {
        self.as_duration().saturating_sub(earlier.as_duration())
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Timestamp({self})")
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let duration = self.as_duration();
        let micros = duration.subsec_micros();
        let secs = duration.as_secs() % 60;
        let mins = duration.as_secs() / 60 % 60;
        let hours = duration.as_secs() / 60 / 60;
        if micros != 0 {
            write!(f, "{hours}:{mins:02}:{secs:02}.{micros:06}")
        } else {
            write!(f, "{hours}:{mins:02}:{secs:02}")
        }
    }
}

impl core::ops::Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Self::Output {
        Timestamp::from_duration(self.as_duration() + rhs)
    }
}

impl core::ops::AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, other: Duration) {
        *self = *self + other;
    }
}

impl core::ops::Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Self::Output {
        self.as_duration() - rhs.as_duration()
    }
}

impl core::ops::Sub<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn sub(self, rhs: Duration) -> Self::Output {
        Timestamp::from_duration(self.as_duration() - rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_from_and_to_duration() {
        let ts1 = Timestamp::from_millis(100);
        let ts2 = Timestamp::from_millis(220);

        // Subtract timestamps to gain a duration
        assert_eq!(Duration::from_millis(120), ts2 - ts1);

        // Add duration to timestamp
        let ts3 = ts2 + Duration::from_millis(11);
        assert_eq!(Duration::from_millis(231), ts3.as_duration());

        // Subtract a duration from a timestamp
        let ts4 = ts3 - Duration::from_millis(41);
        assert_eq!(Duration::from_millis(190), ts4.as_duration());
    }

    #[test]
    fn epoch_rounds_up() {
        // Zero is not representable; it rounds to 1us after the epoch
        let epoch = Timestamp::from_duration(Duration::ZERO);
        assert_eq!(Duration::from_micros(1), epoch.as_duration());
        assert_eq!(epoch, Timestamp::from_millis(0));
    }

    #[test]
    fn checked_math() {
        let initial = Timestamp::from_millis(500);

        assert_eq!(
            Some(Timestamp::from_millis(700)),
            initial.checked_add(Duration::from_millis(200))
        );
        assert_eq!(None, initial.checked_add(Duration::from_secs(u64::MAX)));

        assert_eq!(
            Some(Timestamp::from_millis(300)),
            initial.checked_sub(Duration::from_millis(200))
        );
        assert_eq!(None, initial.checked_sub(Duration::from_secs(1)));
    }

    #[test]
    fn saturating_duration_since() {
        let earlier = Timestamp::from_millis(1_000);
        let later = Timestamp::from_millis(1_200);

        assert_eq!(
            Duration::from_millis(200),
            later.saturating_duration_since(earlier)
        );
        assert_eq!(Duration::ZERO, earlier.saturating_duration_since(later));
    }

    #[test]
    fn fmt() {
        assert_eq!("Timestamp(0:00:01)", format!("{:?}", Timestamp::from_millis(1_000)));
        assert_eq!(
            "Timestamp(0:00:01.000001)",
            format!(
                "{:?}",
                Timestamp::from_duration(Duration::from_secs(1) + Duration::from_micros(1))
            )
        );
    }
}
