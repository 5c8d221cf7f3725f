//! Daily recurrence: an `HH:MM` time of day and its next occurrence.
//!
//! The next fire instant is always derived from the time of day and a
//! wall-clock date, never by adding 24h to a previous instant.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Days, Duration, LocalResult, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::error::NotifyError;

/// A wall-clock time of day with minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    pub fn new(hour: u8, minute: u8) -> Result<Self, NotifyError> {
        if hour > 23 || minute > 59 {
            return Err(NotifyError::InvalidTime(format!("{hour}:{minute:02}")));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    fn as_naive(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.hour.into(), self.minute.into(), 0).unwrap_or(NaiveTime::MIN)
    }
}

impl FromStr for TimeOfDay {
    type Err = NotifyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NotifyError::InvalidTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let digits = |part: &str, max_len: usize| {
            !part.is_empty() && part.len() <= max_len && part.bytes().all(|b| b.is_ascii_digit())
        };
        if !digits(h, 2) || m.len() != 2 || !digits(m, 2) {
            return Err(invalid());
        }
        let hour: u8 = h.parse().map_err(|_| invalid())?;
        let minute: u8 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = NotifyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// Soonest instant strictly after `after` at which the local wall clock
/// shows `time`: today if still ahead, otherwise tomorrow. A match within the
/// same minute counts as already passed.
pub fn next_occurrence(time: TimeOfDay, after: DateTime<Utc>, clock: &dyn Clock) -> DateTime<Utc> {
    let local_after = clock.to_local(after);
    let start = local_after.date();

    for offset in 0..3 {
        let Some(day) = start.checked_add_days(Days::new(offset)) else {
            break;
        };
        let candidate = day.and_time(time.as_naive());
        if candidate <= local_after {
            continue;
        }
        if let Some(at) = resolve_local(clock, candidate) {
            if at > after {
                return at;
            }
        }
    }

    tracing::warn!(
        "⚠️ Could not resolve {time} in local time after {after}, falling back to +1 day"
    );
    after + Duration::days(1)
}

/// Map a local wall-clock reading to an instant. Repeated readings take the
/// earlier instant; readings skipped by a forward shift move past the gap.
fn resolve_local(clock: &dyn Clock, local: NaiveDateTime) -> Option<DateTime<Utc>> {
    match clock.from_local(local) {
        LocalResult::Single(at) => Some(at),
        LocalResult::Ambiguous(earliest, _) => Some(earliest),
        LocalResult::None => match clock.from_local(local + Duration::hours(1)) {
            LocalResult::Single(at) | LocalResult::Ambiguous(at, _) => Some(at),
            LocalResult::None => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeClock, utc};
    use chrono::{FixedOffset, Timelike};

    #[test]
    fn test_parse_and_display() {
        let t: TimeOfDay = "09:05".parse().unwrap();
        assert_eq!((t.hour(), t.minute()), (9, 5));
        assert_eq!(t.to_string(), "09:05");
        assert_eq!("7:30".parse::<TimeOfDay>().unwrap().to_string(), "07:30");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for raw in ["", "9", "24:00", "12:60", "12:5", "ab:cd", "12:345", "-1:00", "12:00:00"] {
            assert!(raw.parse::<TimeOfDay>().is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn test_serde_as_string() {
        let t: TimeOfDay = serde_json::from_str("\"20:00\"").unwrap();
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"20:00\"");
        assert!(serde_json::from_str::<TimeOfDay>("\"25:00\"").is_err());
    }

    #[test]
    fn test_later_today() {
        let clock = FakeClock::new(utc("2024-01-01T08:00:00Z"));
        let next = next_occurrence("20:00".parse().unwrap(), clock.now(), &clock);
        assert_eq!(next, utc("2024-01-01T20:00:00Z"));
    }

    #[test]
    fn test_already_passed_rolls_to_tomorrow() {
        let clock = FakeClock::new(utc("2024-01-01T21:00:00Z"));
        let next = next_occurrence("20:00".parse().unwrap(), clock.now(), &clock);
        assert_eq!(next, utc("2024-01-02T20:00:00Z"));
    }

    #[test]
    fn test_same_minute_counts_as_passed() {
        let t: TimeOfDay = "20:00".parse().unwrap();
        let exact = FakeClock::new(utc("2024-01-01T20:00:00Z"));
        assert_eq!(next_occurrence(t, exact.now(), &exact), utc("2024-01-02T20:00:00Z"));
        let within = FakeClock::new(utc("2024-01-01T20:00:42Z"));
        assert_eq!(next_occurrence(t, within.now(), &within), utc("2024-01-02T20:00:00Z"));
    }

    #[test]
    fn test_within_24h_and_in_future_for_every_minute() {
        let clock = FakeClock::with_offset(
            utc("2024-03-10T13:37:21Z"),
            FixedOffset::east_opt(5 * 3600 + 1800).unwrap(),
        );
        let now = clock.now();
        for hour in 0..24 {
            for minute in (0..60).step_by(7) {
                let t = TimeOfDay::new(hour, minute).unwrap();
                let next = next_occurrence(t, now, &clock);
                assert!(next > now);
                assert!(next - now <= Duration::hours(24));
                let local = clock.to_local(next);
                assert_eq!(
                    (local.hour() as u8, local.minute() as u8, local.second()),
                    (hour, minute, 0)
                );
            }
        }
    }

    #[test]
    fn test_local_offset_applies() {
        // 20:00 at UTC+2 is 18:00 UTC.
        let clock = FakeClock::with_offset(
            utc("2024-01-01T10:00:00Z"),
            FixedOffset::east_opt(7200).unwrap(),
        );
        let next = next_occurrence("20:00".parse().unwrap(), clock.now(), &clock);
        assert_eq!(next, utc("2024-01-01T18:00:00Z"));
    }

    #[test]
    fn test_forward_shift_keeps_wall_clock_time() {
        // UTC+1 until 2024-03-31T01:00Z, UTC+2 afterwards.
        let clock = FakeClock::with_offset(
            utc("2024-03-30T08:00:30Z"),
            FixedOffset::east_opt(3600).unwrap(),
        )
        .shifting_at(utc("2024-03-31T01:00:00Z"), FixedOffset::east_opt(7200).unwrap());
        // 09:00 local on the 30th has just passed; the 31st is a 23h day.
        let next = next_occurrence("09:00".parse().unwrap(), clock.now(), &clock);
        assert_eq!(next, utc("2024-03-31T07:00:00Z"));
    }

    #[test]
    fn test_time_inside_skipped_hour_moves_past_gap() {
        let clock = FakeClock::with_offset(
            utc("2024-03-30T12:00:00Z"),
            FixedOffset::east_opt(3600).unwrap(),
        )
        .shifting_at(utc("2024-03-31T01:00:00Z"), FixedOffset::east_opt(7200).unwrap());
        // Local 02:30 does not exist on the 31st; 03:30 local (01:30Z) is used.
        let next = next_occurrence("02:30".parse().unwrap(), clock.now(), &clock);
        assert_eq!(next, utc("2024-03-31T01:30:00Z"));
    }
}
