//! Time sources
//!
//! Clock-window triggers ask a [`Clock`] for the current time instead of
//! reading the system time directly, so schedules can be driven by a
//! [`ManualClock`] in tests and simulations.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::fmt;
use std::sync::{Arc, RwLock};

/// A source of the current time
pub trait Clock: Send + Sync + fmt::Debug {
    /// The current instant
    fn now(&self) -> DateTime<Utc>;

    /// The given time of day on the clock's current date
    fn today_at(&self, time: NaiveTime) -> DateTime<Utc> {
        self.now().date_naive().and_time(time).and_utc()
    }
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A controllable time source
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Create a manual clock starting at the current time
    pub fn new() -> Self {
        Self::at(Utc::now())
    }

    /// Create a manual clock starting at a specific time
    pub fn at(time: DateTime<Utc>) -> Self {
        Self {
            current: Arc::new(RwLock::new(time)),
        }
    }

    /// Set the current time
    pub fn set(&self, time: DateTime<Utc>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = time;
    }

    /// Advance time by a duration
    pub fn advance(&self, duration: Duration) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current += duration;
    }

    /// Advance time by seconds
    pub fn advance_seconds(&self, seconds: i64) {
        self.advance(Duration::seconds(seconds));
    }

    /// Advance time by minutes
    pub fn advance_minutes(&self, minutes: i64) {
        self.advance(Duration::minutes(minutes));
    }

    /// Advance time by hours
    pub fn advance_hours(&self, hours: i64) {
        self.advance(Duration::hours(hours));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        let clock = ManualClock::at(start);
        assert_eq!(clock.now(), start);

        clock.advance_seconds(30);
        clock.advance_minutes(1);
        clock.advance_hours(2);
        assert_eq!(clock.now(), start + Duration::seconds(30 + 60 + 7200));
    }

    #[test]
    fn test_clones_share_time() {
        let clock = ManualClock::new();
        let other = clock.clone();
        let target = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();

        other.set(target);
        assert_eq!(clock.now(), target);
    }

    #[test]
    fn test_today_at() {
        let clock = ManualClock::at(Utc.with_ymd_and_hms(2024, 5, 1, 13, 45, 10).unwrap());
        let at = clock.today_at(NaiveTime::from_hms_opt(6, 30, 0).unwrap());
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 5, 1, 6, 30, 0).unwrap());
    }

    #[test]
    fn test_system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
