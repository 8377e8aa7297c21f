//! Time abstractions
//!
//! Simulated time is measured in abstract ticks. Bursts, quanta and swap
//! latencies are all expressed in the same unit.

use core::ops::{Add, Sub};
use serde::{Deserialize, Serialize};

/// A point in simulated time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Instant {
    ticks: u64,
}

impl Instant {
    pub const ZERO: Instant = Instant { ticks: 0 };

    /// Creates an instant from a tick count
    pub const fn from_ticks(ticks: u64) -> Self {
        Self { ticks }
    }

    /// Returns ticks since boot
    pub const fn as_ticks(&self) -> u64 {
        self.ticks
    }

    /// Returns the duration since another instant
    ///
    /// Saturates at zero if `earlier` is actually later.
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration::from_ticks(self.ticks.saturating_sub(earlier.ticks))
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, duration: Duration) -> Self::Output {
        Instant::from_ticks(self.ticks.saturating_add(duration.as_ticks()))
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, duration: Duration) -> Self::Output {
        Instant::from_ticks(self.ticks.saturating_sub(duration.as_ticks()))
    }
}

/// A span of simulated time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Duration {
    ticks: u64,
}

impl Duration {
    pub const ZERO: Duration = Duration { ticks: 0 };

    /// Creates a duration from a tick count
    pub const fn from_ticks(ticks: u64) -> Self {
        Self { ticks }
    }

    /// Returns the duration in ticks
    pub const fn as_ticks(&self) -> u64 {
        self.ticks
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, other: Duration) -> Self::Output {
        Duration::from_ticks(self.ticks.saturating_add(other.ticks))
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, other: Duration) -> Self::Output {
        Duration::from_ticks(self.ticks.saturating_sub(other.ticks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_arithmetic() {
        let d1 = Duration::from_ticks(50);
        let d2 = Duration::from_ticks(30);

        assert_eq!(d1 + d2, Duration::from_ticks(80));
        assert_eq!(d1 - d2, Duration::from_ticks(20));
        assert_eq!(d2 - d1, Duration::ZERO);
    }

    #[test]
    fn test_instant_ordering() {
        let i1 = Instant::from_ticks(10);
        let i2 = Instant::from_ticks(20);
        assert!(i2 > i1);
    }

    #[test]
    fn test_instant_duration_since() {
        let i1 = Instant::from_ticks(100);
        let i2 = Instant::from_ticks(145);
        assert_eq!(i2.duration_since(i1), Duration::from_ticks(45));
        assert_eq!(i1.duration_since(i2), Duration::ZERO);
    }

    #[test]
    fn test_instant_arithmetic() {
        let i = Instant::from_ticks(100);
        let d = Duration::from_ticks(30);

        assert_eq!(i + d, Instant::from_ticks(130));
        assert_eq!(i - d, Instant::from_ticks(70));
    }
}
