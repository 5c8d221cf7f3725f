//! Wall-clock source for the scheduler.
//!
//! Instants are stored in UTC; time-of-day matching happens in the clock's
//! local zone so a reminder set for 09:00 stays at 09:00 across offset changes.

use chrono::{DateTime, Local, LocalResult, NaiveDateTime, TimeZone, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Wall-clock reading of `instant` in the local zone.
    fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime;

    /// Instant(s) at which the local wall clock shows `local`.
    fn from_local(&self, local: NaiveDateTime) -> LocalResult<DateTime<Utc>>;
}

/// System clock in the process's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn to_local(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&Local).naive_local()
    }

    fn from_local(&self, local: NaiveDateTime) -> LocalResult<DateTime<Utc>> {
        Local
            .from_local_datetime(&local)
            .map(|dt| dt.with_timezone(&Utc))
    }
}
