//! Calendar decomposition for the `time` dimension.
//!
//! All fields are UTC. `week` is the ISO-8601 week number (1..=53, weeks
//! start on Monday); `weekday` counts from Sunday = 0 to Saturday = 6.
//! `year` is the calendar year, not the ISO week-year, so the first days of
//! January may carry week 52 or 53.

use chrono::{DateTime, Datelike, Timelike, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeParts {
    pub start_time: i64,
    pub hour: u32,
    pub day: u32,
    pub week: u32,
    pub month: u32,
    pub year: i32,
    pub weekday: u32,
}

/// Decompose an epoch-millisecond timestamp. Returns `None` when the value
/// is outside the range chrono can represent.
#[must_use]
pub fn decompose(start_time: i64) -> Option<TimeParts> {
    let at: DateTime<Utc> = DateTime::from_timestamp_millis(start_time)?;
    Some(TimeParts {
        start_time,
        hour: at.hour(),
        day: at.day(),
        week: at.iso_week().week(),
        month: at.month(),
        year: at.year(),
        weekday: at.weekday().num_days_from_sunday(),
    })
}
