use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use uuid::Uuid;

use crate::models::session::{ReminderStage, Session};

/// Category attached to in-app notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Booking,
    Payment,
    Cancellation,
    Reschedule,
    Reminder,
    SessionUpdate,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Booking => "booking",
            NotificationKind::Payment => "payment",
            NotificationKind::Cancellation => "cancellation",
            NotificationKind::Reschedule => "reschedule",
            NotificationKind::Reminder => "reminder",
            NotificationKind::SessionUpdate => "session_update",
        }
    }
}

/// Date and interval of a session at some point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScheduleSnapshot {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

impl ScheduleSnapshot {
    pub fn of(session: &Session) -> Self {
        Self {
            date: session.session_date,
            start_time: session.start_time,
            end_time: session.end_time,
        }
    }
}

impl std::fmt::Display for ScheduleSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}-{}",
            self.date,
            self.start_time.format("%H:%M"),
            self.end_time.format("%H:%M")
        )
    }
}

/// Templated emails the mail service knows how to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum EmailTemplate {
    BookingConfirmation { schedule: ScheduleSnapshot },
    Cancellation { schedule: ScheduleSnapshot, refund_issued: bool },
    Reschedule { previous: ScheduleSnapshot, current: ScheduleSnapshot },
    Reminder { schedule: ScheduleSnapshot, stage: ReminderStage },
    PaymentFailed { schedule: ScheduleSnapshot },
}

/// Work that must happen after a transition commits.
///
/// Intents are carried out best-effort; a failure never undoes the commit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "effect", rename_all = "snake_case")]
pub enum SideEffect {
    CreateMeeting {
        session_id: Uuid,
        tutor_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i32,
    },
    Notify {
        account_id: Uuid,
        title: String,
        body: String,
        kind: NotificationKind,
    },
    Email {
        account_id: Uuid,
        session_id: Uuid,
        template: EmailTemplate,
    },
}

impl SideEffect {
    pub fn notify(account_id: Uuid, title: &str, body: String, kind: NotificationKind) -> Self {
        SideEffect::Notify {
            account_id,
            title: title.to_string(),
            body,
            kind,
        }
    }

    pub fn email(account_id: Uuid, session_id: Uuid, template: EmailTemplate) -> Self {
        SideEffect::Email {
            account_id,
            session_id,
            template,
        }
    }
}
