// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Send-rate datatype shared by the probing policies

use core::fmt;
use num_rational::Ratio;

const BITS_PER_KILOBIT: u64 = 1_000;

/// A send rate in bits per second
///
/// Probe targets, estimator feedback and configured limits are all carried
/// as `Bandwidth` values. `INFINITY` stands in for "no limit" and is
/// preserved by scaling, so an unset ceiling never turns into a finite one.
#[derive(Copy, Clone, Debug, Default, Eq, Ord, PartialOrd, PartialEq, Hash)]
pub struct Bandwidth {
    bits_per_second: u64,
}

impl Bandwidth {
    pub const ZERO: Bandwidth = Bandwidth { bits_per_second: 0 };

    /// The "no limit" value
    pub const INFINITY: Bandwidth = Bandwidth {
        bits_per_second: u64::MAX,
    };

    /// Constructs a new `Bandwidth` with the given bits per second
    #[inline]
    pub const fn bits_per_second(bits_per_second: u64) -> Self {
        Self { bits_per_second }
    }

    /// Constructs a new `Bandwidth` with the given kilobits per second
    #[inline]
    pub const fn kilobits_per_second(kilobits_per_second: u64) -> Self {
        Self {
            bits_per_second: kilobits_per_second.saturating_mul(BITS_PER_KILOBIT),
        }
    }

    /// Returns the rate in bits per second
    #[inline]
    pub const fn as_bits_per_second(self) -> u64 {
        self.bits_per_second
    }

    /// Returns the rate in kilobits per second, truncating
    #[inline]
    pub const fn as_kilobits_per_second(self) -> u64 {
        self.bits_per_second / BITS_PER_KILOBIT
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.bits_per_second == 0
    }

    #[inline]
    pub const fn is_infinite(self) -> bool {
        self.bits_per_second == u64::MAX
    }
}

/// Scales the rate by the given ratio, saturating at `INFINITY`
///
/// `INFINITY` is a sentinel rather than a magnitude, so it is preserved
/// exactly instead of being scaled.
impl core::ops::Mul<Ratio<u64>> for Bandwidth {
    type Output = Bandwidth;

    #[inline]
    fn mul(self, rhs: Ratio<u64>) -> Self::Output {
        if self.is_infinite() {
            return Bandwidth::INFINITY;
        }
        // Widen to u128 so large rates survive numerators like 6x intact
        let bits = self.bits_per_second as u128 * *rhs.numer() as u128 / *rhs.denom() as u128;
        Bandwidth {
            bits_per_second: bits.min(u64::MAX as u128) as u64,
        }
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "inf")
        } else {
            write!(f, "{}bps", self.bits_per_second)
        }
    }
}
