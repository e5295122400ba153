use chrono::{NaiveDate, NaiveTime, Weekday};
use garde::Validate;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::availability::weekday_from_i16;
use crate::models::session::SessionKind;
use crate::models::slot::is_whole_minute;

/// Rejects an end that does not come after `start`.
fn after(start: NaiveTime) -> impl FnOnce(&NaiveTime, &()) -> garde::Result {
    move |end, _| {
        if *end <= start {
            return Err(garde::Error::new("end_time must be after start_time"));
        }
        Ok(())
    }
}

/// Rejects times that carry seconds; slots are laid out on whole minutes.
fn whole_minute(time: &NaiveTime, _: &()) -> garde::Result {
    if !is_whole_minute(*time) {
        return Err(garde::Error::new("time must be a whole minute"));
    }
    Ok(())
}

fn whole_minute_if_set(time: &Option<NaiveTime>, ctx: &()) -> garde::Result {
    match time {
        Some(time) => whole_minute(time, ctx),
        None => Ok(()),
    }
}

fn default_kind() -> SessionKind {
    SessionKind::Regular
}

/// Body of `POST /api/sessions`.
#[derive(Debug, Deserialize, Validate)]
pub struct BookSessionRequest {
    #[garde(skip)]
    pub tutor_id: Uuid,
    #[garde(skip)]
    pub date: NaiveDate,
    #[garde(custom(whole_minute))]
    pub start_time: NaiveTime,
    /// Required for regular sessions; trial sessions derive it.
    #[garde(custom(whole_minute_if_set))]
    pub end_time: Option<NaiveTime>,
    #[serde(default = "default_kind")]
    #[garde(skip)]
    pub kind: SessionKind,
    #[garde(length(max = 1000))]
    pub notes: Option<String>,
}

impl BookSessionRequest {
    /// The end time to book with, after the kind-specific rules.
    pub fn resolved_end(&self) -> Result<NaiveTime> {
        match (self.kind, self.end_time) {
            (SessionKind::Regular, Some(end)) => Ok(end),
            (SessionKind::Regular, None) => Err(AppError::Validation(
                "end_time is required for regular sessions".to_string(),
            )),
            // Overridden by the trial length.
            (SessionKind::Trial, end) => Ok(end.unwrap_or(self.start_time)),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmPaymentRequest {
    #[garde(length(min = 1, max = 255))]
    pub payment_ref: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CancelSessionRequest {
    #[garde(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RescheduleSessionRequest {
    #[garde(skip)]
    pub date: NaiveDate,
    #[garde(custom(whole_minute))]
    pub start_time: NaiveTime,
    #[garde(custom(after(self.start_time)), custom(whole_minute))]
    pub end_time: NaiveTime,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddWindowRequest {
    /// ISO weekday, Monday = 1.
    #[garde(range(min = 1, max = 7))]
    pub day_of_week: i16,
    #[garde(custom(whole_minute))]
    pub start_time: NaiveTime,
    #[garde(custom(after(self.start_time)), custom(whole_minute))]
    pub end_time: NaiveTime,
}

impl AddWindowRequest {
    pub fn weekday(&self) -> Result<Weekday> {
        weekday_from_i16(self.day_of_week)
            .ok_or_else(|| AppError::Validation("day_of_week must be between 1 and 7".to_string()))
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddBlockRequest {
    #[garde(skip)]
    pub date: NaiveDate,
    #[garde(custom(whole_minute))]
    pub start_time: NaiveTime,
    #[garde(custom(after(self.start_time)), custom(whole_minute))]
    pub end_time: NaiveTime,
    #[garde(length(max = 255))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Completed,
    Failed,
}

/// Body of the payment provider's settlement callback.
#[derive(Debug, Deserialize, Validate)]
pub struct PaymentOutcomeRequest {
    #[garde(skip)]
    pub purchase_id: Uuid,
    #[garde(skip)]
    pub status: OutcomeStatus,
    #[garde(length(min = 1, max = 255))]
    pub reference: Option<String>,
    #[garde(length(max = 500))]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SlotsQuery {
    pub date: NaiveDate,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_reschedule_requires_ordered_times() {
        let backwards = RescheduleSessionRequest {
            date: NaiveDate::from_ymd_opt(2026, 10, 26).unwrap(),
            start_time: t(10, 0),
            end_time: t(9, 30),
        };
        assert!(backwards.validate().is_err());

        let ok = RescheduleSessionRequest { end_time: t(10, 25), ..backwards };
        assert!(ok.validate().is_ok());
    }

    #[test]
    fn test_times_with_seconds_are_rejected() {
        let window = AddWindowRequest {
            day_of_week: 1,
            start_time: NaiveTime::from_hms_opt(9, 0, 30).unwrap(),
            end_time: t(10, 0),
        };
        assert!(window.validate().is_err());

        let block = AddBlockRequest {
            date: NaiveDate::from_ymd_opt(2026, 10, 26).unwrap(),
            start_time: t(9, 0),
            end_time: NaiveTime::from_hms_opt(9, 30, 15).unwrap(),
            reason: None,
        };
        assert!(block.validate().is_err());

        let booking = BookSessionRequest {
            tutor_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2026, 10, 26).unwrap(),
            start_time: t(10, 0),
            end_time: Some(NaiveTime::from_hms_milli_opt(10, 25, 0, 500).unwrap()),
            kind: SessionKind::Regular,
            notes: None,
        };
        assert!(booking.validate().is_err());

        let whole = BookSessionRequest { end_time: Some(t(10, 25)), ..booking };
        assert!(whole.validate().is_ok());
    }

    #[test]
    fn test_window_weekday_bounds() {
        let request = AddWindowRequest {
            day_of_week: 8,
            start_time: t(9, 0),
            end_time: t(12, 0),
        };
        assert!(request.validate().is_err());

        let monday = AddWindowRequest { day_of_week: 1, ..request };
        assert!(monday.validate().is_ok());
        assert_eq!(monday.weekday().unwrap(), Weekday::Mon);
    }

    #[test]
    fn test_regular_booking_needs_end_time() {
        let request = BookSessionRequest {
            tutor_id: Uuid::nil(),
            date: NaiveDate::from_ymd_opt(2026, 10, 26).unwrap(),
            start_time: t(10, 0),
            end_time: None,
            kind: SessionKind::Regular,
            notes: None,
        };
        assert!(matches!(request.resolved_end(), Err(AppError::Validation(_))));

        let trial = BookSessionRequest { kind: SessionKind::Trial, ..request };
        assert!(trial.resolved_end().is_ok());
    }
}
