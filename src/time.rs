//! Simulated time types.
//!
//! All time values are passed explicitly; nothing reads a platform clock.
//! Both types wrap milliseconds to keep unit conversions visible and to make
//! same-seed runs bit-for-bit reproducible (no float accumulation in the
//! scheduler itself).

use core::ops::{Add, AddAssign, Sub, SubAssign};

/// A point in simulated time, in milliseconds since simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Simulation start.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Maximum representable timestamp.
    pub const MAX: Timestamp = Timestamp(u64::MAX);

    /// Create a timestamp from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Timestamp(ms)
    }

    /// Create a timestamp from whole seconds.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Timestamp(secs.saturating_mul(1000))
    }

    /// Create a timestamp from fractional seconds, rounded to milliseconds.
    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        Timestamp((secs * 1000.0).round() as u64)
    }

    /// Milliseconds since simulation start.
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Whole seconds since simulation start (truncated).
    #[inline]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1000
    }

    /// Fractional seconds since simulation start.
    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Saturating addition of a duration.
    #[inline]
    pub const fn saturating_add(self, duration: Duration) -> Self {
        Timestamp(self.0.saturating_add(duration.0))
    }

    /// Saturating difference to an earlier timestamp.
    #[inline]
    pub const fn saturating_sub(self, other: Timestamp) -> Duration {
        Duration(self.0.saturating_sub(other.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs.0)
    }
}

impl AddAssign<Duration> for Timestamp {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub for Timestamp {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Timestamp) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl Sub<Duration> for Timestamp {
    type Output = Timestamp;

    #[inline]
    fn sub(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 - rhs.0)
    }
}

/// A span of simulated time, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Duration(u64);

impl Duration {
    /// Zero-length span.
    pub const ZERO: Duration = Duration(0);

    /// Maximum representable span.
    pub const MAX: Duration = Duration(u64::MAX);

    /// Create a duration from milliseconds.
    #[inline]
    pub const fn from_millis(ms: u64) -> Self {
        Duration(ms)
    }

    /// Create a duration from whole seconds.
    #[inline]
    pub const fn from_secs(secs: u64) -> Self {
        Duration(secs.saturating_mul(1000))
    }

    /// Create a duration from fractional seconds, rounded to milliseconds.
    #[inline]
    pub fn from_secs_f64(secs: f64) -> Self {
        Duration((secs * 1000.0).round() as u64)
    }

    /// Length in milliseconds.
    #[inline]
    pub const fn as_millis(self) -> u64 {
        self.0
    }

    /// Length in whole seconds (truncated).
    #[inline]
    pub const fn as_secs(self) -> u64 {
        self.0 / 1000
    }

    /// Length in fractional seconds.
    #[inline]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1000.0
    }

    /// Saturating addition.
    #[inline]
    pub const fn saturating_add(self, other: Duration) -> Self {
        Duration(self.0.saturating_add(other.0))
    }

    /// Saturating subtraction.
    #[inline]
    pub const fn saturating_sub(self, other: Duration) -> Self {
        Duration(self.0.saturating_sub(other.0))
    }

    /// Saturating multiplication by a scalar.
    #[inline]
    pub const fn saturating_mul(self, n: u64) -> Self {
        Duration(self.0.saturating_mul(n))
    }
}

impl Add for Duration {
    type Output = Duration;

    #[inline]
    fn add(self, rhs: Duration) -> Duration {
        Duration(self.0 + rhs.0)
    }
}

impl AddAssign for Duration {
    #[inline]
    fn add_assign(&mut self, rhs: Duration) {
        self.0 += rhs.0;
    }
}

impl Sub for Duration {
    type Output = Duration;

    #[inline]
    fn sub(self, rhs: Duration) -> Duration {
        Duration(self.0 - rhs.0)
    }
}

impl SubAssign for Duration {
    #[inline]
    fn sub_assign(&mut self, rhs: Duration) {
        self.0 -= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_creation() {
        let t1 = Timestamp::from_millis(1500);
        assert_eq!(t1.as_millis(), 1500);
        assert_eq!(t1.as_secs(), 1);

        let t2 = Timestamp::from_secs(5);
        assert_eq!(t2.as_millis(), 5000);

        let t3 = Timestamp::from_secs_f64(12.5);
        assert_eq!(t3.as_millis(), 12500);
        assert_eq!(t3.as_secs_f64(), 12.5);
    }

    #[test]
    fn test_duration_creation() {
        let d1 = Duration::from_millis(2500);
        assert_eq!(d1.as_millis(), 2500);
        assert_eq!(d1.as_secs(), 2);

        let d2 = Duration::from_secs_f64(0.125);
        assert_eq!(d2.as_millis(), 125);
    }

    #[test]
    fn test_arithmetic() {
        let t = Timestamp::from_secs(10) + Duration::from_secs(5);
        assert_eq!(t.as_secs(), 15);

        let diff = Timestamp::from_secs(20) - Timestamp::from_secs(10);
        assert_eq!(diff, Duration::from_secs(10));

        assert_eq!(
            Duration::from_secs(3) + Duration::from_secs(4),
            Duration::from_secs(7)
        );
        assert_eq!(Duration::from_millis(250).saturating_mul(4).as_secs(), 1);
    }

    #[test]
    fn test_saturating_operations() {
        assert_eq!(
            Timestamp::MAX.saturating_add(Duration::from_secs(1)),
            Timestamp::MAX
        );
        assert_eq!(
            Timestamp::from_secs(5).saturating_sub(Timestamp::from_secs(10)),
            Duration::ZERO
        );
    }
}
