use nix::libc;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};
use std::time::Duration;

/// Point on the external time base: a signed fixed-point count of time
/// units on the host monotonic clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Time(i64);

impl Time {
    pub const ZERO: Time = Time(0);

    pub const fn from_raw(units: i64) -> Self {
        Self(units)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    pub fn saturating_add(self, units: i64) -> Self {
        Self(self.0.saturating_add(units))
    }
}

impl Add<i64> for Time {
    type Output = Time;

    fn add(self, units: i64) -> Time {
        self.saturating_add(units)
    }
}

/// Distance in time units, saturating at the ends of the `i64` range.
impl Sub for Time {
    type Output = i64;

    fn sub(self, rhs: Time) -> i64 {
        self.0.saturating_sub(rhs.0)
    }
}

/// Converts between seconds and [`Time`] units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBase {
    units_per_second: u64,
}

impl TimeBase {
    pub const fn new(units_per_second: u64) -> Self {
        Self { units_per_second }
    }

    pub fn units_per_second(&self) -> u64 {
        self.units_per_second
    }

    pub fn from_secs_f64(&self, secs: f64) -> Time {
        Time((secs * self.units_per_second as f64).floor() as i64)
    }

    pub fn to_secs_f64(&self, t: Time) -> f64 {
        t.0 as f64 / self.units_per_second as f64
    }

    pub fn duration(&self, d: Duration) -> i64 {
        let units = d.as_nanos() * self.units_per_second as u128 / 1_000_000_000;
        i64::try_from(units).unwrap_or(i64::MAX)
    }

    pub fn now(&self) -> Time {
        self.from_secs_f64(host_seconds())
    }

    /// External time `delay` from now.
    pub fn after(&self, delay: Duration) -> Time {
        self.now().saturating_add(self.duration(delay))
    }
}

/// Seconds on the host monotonic clock.
pub fn host_seconds() -> f64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    if rc != 0 {
        return 0.0;
    }
    ts.tv_sec as f64 + ts.tv_nsec as f64 * 1.0e-9
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thirty_two_fractional_bits_per_second() {
        let base = TimeBase::new(1 << 32);
        assert_eq!(base.from_secs_f64(1.5).raw(), 3 << 31);
        assert_eq!(base.duration(Duration::from_millis(250)), 1 << 30);
        assert_eq!(base.to_secs_f64(Time::from_raw(1 << 33)), 2.0);
    }

    #[test]
    fn host_clock_is_monotonic() {
        let a = host_seconds();
        let b = host_seconds();
        assert!(a > 0.0);
        assert!(b >= a);
    }

    #[test]
    fn ordering_and_arithmetic() {
        let t = Time::from_raw(100);
        assert!(t + 1 > t);
        assert_eq!((t + 24) - t, 24);
        assert_eq!(Time::from_raw(i64::MAX).saturating_add(5).raw(), i64::MAX);
    }

    #[test]
    fn distance_saturates_at_the_range_ends() {
        assert_eq!(Time::from_raw(i64::MIN) - Time::from_raw(1), i64::MIN);
        assert_eq!(Time::from_raw(i64::MAX) - Time::from_raw(-1), i64::MAX);
        assert_eq!((Time::from_raw(i64::MAX) + 1).raw(), i64::MAX);
    }
}
