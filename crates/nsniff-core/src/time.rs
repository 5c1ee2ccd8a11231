//! Capture timestamps

use chrono::{DateTime, Local, TimeZone, Timelike};
use std::fmt;

/// Wall-clock time of a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeInfo {
    /// Local hour (0-23)
    pub hours: u32,
    /// Local minute
    pub minutes: u32,
    /// Local second
    pub seconds: u32,
    /// Milliseconds within the second
    pub milliseconds: u32,
    /// Seconds since the Unix epoch
    pub timestamp_sec: i64,
    /// Nanoseconds within the second
    pub timestamp_nsec: u32,
}

impl TimeInfo {
    /// Current local time
    pub fn now() -> Self {
        Self::from_datetime(&Local::now())
    }

    /// Build from any `chrono` date-time
    pub fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        // chrono reports leap seconds as nanos >= 1e9
        let nanos = dt.nanosecond().min(999_999_999);
        Self {
            hours: dt.hour(),
            minutes: dt.minute(),
            seconds: dt.second(),
            milliseconds: nanos / 1_000_000,
            timestamp_sec: dt.timestamp(),
            timestamp_nsec: nanos,
        }
    }
}

impl fmt::Display for TimeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}:{:02}:{:02}.{:03}",
            self.hours, self.minutes, self.seconds, self.milliseconds
        )
    }
}
