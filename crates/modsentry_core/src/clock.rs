//! # Clock
//!
//! Wall-clock input for secret rotation and the scheduled refresh.
//!
//! Everything that depends on "today" asks a [`Clock`] instead of the
//! system, so a test can pin the date and a server can run on local time.

use chrono::{Local, NaiveDate, NaiveDateTime};
use std::sync::atomic::{AtomicI64, Ordering};

/// Source of the current local date and time.
pub trait Clock: Send + Sync {
    /// Current local date and time.
    fn now(&self) -> NaiveDateTime;

    /// Current local date.
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// The host's local clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// A clock that only moves when told to.
///
/// Stored as seconds since the Unix epoch so it can be advanced through a
/// shared reference from another thread.
#[derive(Debug)]
pub struct FixedClock {
    seconds: AtomicI64,
}

impl FixedClock {
    /// Creates a clock pinned at `at`.
    #[must_use]
    pub fn new(at: NaiveDateTime) -> Self {
        Self {
            seconds: AtomicI64::new(at.and_utc().timestamp()),
        }
    }

    /// Creates a clock pinned at midday on the given date.
    ///
    /// Returns `None` for dates chrono cannot represent.
    #[must_use]
    pub fn on_date(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .map(Self::new)
    }

    /// Moves the clock to `at`.
    pub fn set(&self, at: NaiveDateTime) {
        self.seconds.store(at.and_utc().timestamp(), Ordering::SeqCst);
    }

    /// Moves the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        self.seconds.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        let secs = self.seconds.load(Ordering::SeqCst);
        chrono::DateTime::from_timestamp(secs, 0)
            .map(|dt| dt.naive_utc())
            .unwrap_or_default()
    }
}
