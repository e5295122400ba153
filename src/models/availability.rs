use chrono::{NaiveDate, NaiveTime, Weekday};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::slot::TimeRange;

/// Soft-delete marker shared by windows and blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "record_status")]
pub enum RecordStatus {
    #[postgres(name = "active")]
    Active,
    #[postgres(name = "deleted")]
    Deleted,
}

/// A tutor's recurring weekly offer of time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Uuid,
    pub tutor_id: Uuid,
    pub day_of_week: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub status: RecordStatus,
}

impl AvailabilityWindow {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}

/// A one-off interval on a specific date when the tutor is unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: Uuid,
    pub tutor_id: Uuid,
    pub block_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub reason: Option<String>,
    pub status: RecordStatus,
}

impl Block {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }
}

/// Weekdays are stored as ISO numbers, Monday = 1.
pub fn weekday_to_i16(day: Weekday) -> i16 {
    day.number_from_monday() as i16
}

pub fn weekday_from_i16(value: i16) -> Option<Weekday> {
    match value {
        1 => Some(Weekday::Mon),
        2 => Some(Weekday::Tue),
        3 => Some(Weekday::Wed),
        4 => Some(Weekday::Thu),
        5 => Some(Weekday::Fri),
        6 => Some(Weekday::Sat),
        7 => Some(Weekday::Sun),
        _ => None,
    }
}
