use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::slot::TimeRange;

/// Where a session is in its lifecycle.
///
/// `Pending` holds a slot while payment is outstanding. `Completed`,
/// `Cancelled` and `NoShow` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "session_status")]
pub enum SessionStatus {
    #[postgres(name = "pending")]
    Pending,
    #[postgres(name = "scheduled")]
    Scheduled,
    #[postgres(name = "completed")]
    Completed,
    #[postgres(name = "cancelled")]
    Cancelled,
    #[postgres(name = "no_show")]
    NoShow,
}

impl SessionStatus {
    /// Whether a session in this status holds its time interval.
    pub fn occupies_slot(self) -> bool {
        matches!(self, SessionStatus::Pending | SessionStatus::Scheduled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
            SessionStatus::NoShow => "no_show",
        }
    }
}

/// The kind of appointment booked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "snake_case")]
#[postgres(name = "session_kind")]
pub enum SessionKind {
    #[postgres(name = "trial")]
    Trial,
    #[postgres(name = "regular")]
    Regular,
}

/// The last reminder horizon a session has been reminded for.
///
/// Ordered: a session only ever moves forward through the stages until
/// it is rescheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStage {
    None,
    Day,
    Hour,
}

impl ReminderStage {
    pub fn as_i16(self) -> i16 {
        match self {
            ReminderStage::None => 0,
            ReminderStage::Day => 1,
            ReminderStage::Hour => 2,
        }
    }

    pub fn from_i16(value: i16) -> Self {
        match value {
            1 => ReminderStage::Day,
            v if v >= 2 => ReminderStage::Hour,
            _ => ReminderStage::None,
        }
    }
}

/// Join details for the video room attached to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRoom {
    pub meeting_id: String,
    pub join_url: String,
    pub start_url: String,
    pub passcode: Option<String>,
}

/// One booked (or attempted) tutoring appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// The unique identifier for the session.
    pub id: Uuid,
    /// The account that booked the session.
    pub student_id: Uuid,
    /// The tutor account teaching the session.
    pub tutor_id: Uuid,
    /// The calendar date of the session.
    pub session_date: NaiveDate,
    /// Start of the half-open interval.
    pub start_time: NaiveTime,
    /// End of the half-open interval.
    pub end_time: NaiveTime,
    /// Length in minutes, always derived from start and end.
    pub duration_minutes: i32,
    /// Price in cents.
    pub amount_cents: i64,
    /// The linked purchase.
    pub purchase_id: Option<Uuid>,
    pub status: SessionStatus,
    pub notes: Option<String>,
    pub kind: SessionKind,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancelled_by: Option<Uuid>,
    pub cancellation_reason: Option<String>,
    pub reminder_stage: ReminderStage,
    pub meeting: Option<MeetingRoom>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn interval(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    pub fn is_participant(&self, account_id: Uuid) -> bool {
        self.student_id == account_id || self.tutor_id == account_id
    }

    /// The absolute start instant, reading the stored date and time in `offset`.
    pub fn starts_at(&self, offset: &FixedOffset) -> DateTime<Utc> {
        to_utc(self.session_date.and_time(self.start_time), offset)
    }

    /// The absolute end instant, reading the stored date and time in `offset`.
    pub fn ends_at(&self, offset: &FixedOffset) -> DateTime<Utc> {
        to_utc(self.session_date.and_time(self.end_time), offset)
    }
}

/// Interprets a wall-clock schedule time in the given offset.
pub fn to_utc(local: NaiveDateTime, offset: &FixedOffset) -> DateTime<Utc> {
    match offset.from_local_datetime(&local).single() {
        Some(dt) => dt.with_timezone(&Utc),
        // A fixed offset never produces gaps or folds.
        None => Utc.from_utc_datetime(&local),
    }
}

/// Converts an absolute instant into wall-clock schedule time.
pub fn to_local(instant: DateTime<Utc>, offset: &FixedOffset) -> NaiveDateTime {
    instant.with_timezone(offset).naive_local()
}
