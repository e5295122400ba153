use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// A half-open `[start, end)` interval within one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeRange {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Half-open overlap: touching intervals do not overlap.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && self.end > other.start
    }

    /// Whether `other` lies entirely inside this interval.
    pub fn contains(&self, other: &TimeRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    pub fn duration_minutes(&self) -> i32 {
        (minutes_since_midnight(self.end) as i32) - (minutes_since_midnight(self.start) as i32)
    }
}

pub fn minutes_since_midnight(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

/// Like `minutes_since_midnight`, but any seconds push it to the next minute.
pub fn minutes_rounded_up(time: NaiveTime) -> u32 {
    let whole = minutes_since_midnight(time);
    if is_whole_minute(time) { whole } else { whole + 1 }
}

pub fn is_whole_minute(time: NaiveTime) -> bool {
    time.second() == 0 && time.nanosecond() == 0
}

pub fn time_from_minutes(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)
}

/// A slot offered for booking, priced at the tutor's rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookableSlot {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub duration_minutes: i32,
    pub amount_cents: i64,
}

impl BookableSlot {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}
