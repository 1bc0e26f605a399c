//! Wall-clock source for every elapsed-time computation in the timer core.
//!
//! All timestamps are UTC with millisecond precision so that a duration
//! computed locally matches what the session store computes from the same
//! two stored timestamps.

use std::sync::Mutex;

use chrono::{DateTime, Duration, SubsecRound, Utc};
use log::warn;

use crate::error::TimerError;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the host wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(3)
    }
}

/// A clock that only moves when told to. Used by simulations and tests to
/// model suspension gaps without sleeping.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start.trunc_subsecs(3)),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        let mut guard = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard += Duration::milliseconds(ms);
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut guard = match self.now.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = at.trunc_subsecs(3);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Milliseconds from `started_at` to `ended_at`, clamped at zero.
///
/// A negative span means the wall clock stepped backwards between the two
/// reads; it is logged and treated as an empty interval.
pub fn clamped_duration_ms(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> u64 {
    let span = (ended_at - started_at).num_milliseconds();
    if span < 0 {
        let skew = TimerError::ClockSkew { skew_ms: -span };
        warn!("{skew}; clamping duration to zero");
        return 0;
    }
    span as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn epoch() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn manual_clock_only_moves_when_advanced() {
        let clock = ManualClock::new(epoch());
        assert_eq!(clock.now(), epoch());
        clock.advance_ms(1_500);
        assert_eq!(clock.now(), epoch() + Duration::milliseconds(1_500));
    }

    #[test]
    fn duration_is_exact_span() {
        let end = epoch() + Duration::milliseconds(5_000);
        assert_eq!(clamped_duration_ms(epoch(), end), 5_000);
    }

    #[test]
    fn backwards_clock_clamps_to_zero() {
        let end = epoch() - Duration::milliseconds(250);
        assert_eq!(clamped_duration_ms(epoch(), end), 0);
    }

    #[test]
    fn system_clock_has_millisecond_precision() {
        let now = SystemClock.now();
        assert_eq!(now.timestamp_subsec_nanos() % 1_000_000, 0);
    }
}
