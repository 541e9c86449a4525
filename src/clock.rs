//! Source of "now" for every component that compares against the current time.
//!
//! Cache validity, location TTL, notification eligibility and "next prayer" all depend on the
//! current instant and the local calendar day, so the clock is injected rather than read from
//! the system directly.

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    /// Current instant in the device's local offset.
    fn now(&self) -> DateTime<FixedOffset>;

    /// Calendar day key of `now()`, independent of time of day.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Reads the operating system clock and local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    pub fn new(now: DateTime<FixedOffset>) -> Self {
        FixedClock {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock()
    }
}
